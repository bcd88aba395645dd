//! Navigation guard
//!
//! `decide` is pure over (authenticated, admin, target); `RouteGuard` makes
//! sure auth state is initialized before asking it.

use std::sync::Arc;

use tracing::debug;

use crate::routes::Route;
use crate::state::AuthStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Allow,
    Redirect(Route),
}

/// Where a navigation to `target` should end up.
///
/// Rules, first match wins:
/// 1. admin on a guest-only route goes to the dashboard
/// 2. any other signed-in user on a guest-only route goes home
/// 3. anonymous on an auth route goes to login
/// 4. non-admin on an admin route goes home
pub fn decide(is_authenticated: bool, is_admin: bool, target: Route) -> Navigation {
    let meta = target.meta();

    if meta.guest_only && is_authenticated {
        return Navigation::Redirect(if is_admin { Route::Dashboard } else { Route::Home });
    }
    if meta.requires_auth && !is_authenticated {
        return Navigation::Redirect(Route::Login);
    }
    if meta.requires_admin && !is_admin {
        return Navigation::Redirect(Route::Home);
    }
    Navigation::Allow
}

pub struct RouteGuard {
    auth: Arc<AuthStore>,
}

impl RouteGuard {
    pub fn new(auth: Arc<AuthStore>) -> Self {
        Self { auth }
    }

    pub async fn before_each(&self, target: Route) -> Navigation {
        if !self.auth.is_initialized() {
            self.auth.initialize().await;
        }
        let state = self.auth.snapshot();
        let decision = decide(state.is_authenticated, state.is_admin, target);
        debug!(
            authenticated = state.is_authenticated,
            admin = state.is_admin,
            route = target.name(),
            ?decision,
            "navigation guard"
        );
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Secret;
    use portfolio_auth::SessionClient;
    use portfolio_auth::store::MemoryTokenStore;
    use portfolio_auth::testing::{RecordingNavigator, StubProvider};

    #[test]
    fn admin_on_login_goes_to_dashboard() {
        assert_eq!(
            decide(true, true, Route::Login),
            Navigation::Redirect(Route::Dashboard)
        );
        assert_eq!(
            decide(true, true, Route::Register),
            Navigation::Redirect(Route::Dashboard)
        );
    }

    #[test]
    fn signed_in_user_on_login_goes_home() {
        assert_eq!(
            decide(true, false, Route::Login),
            Navigation::Redirect(Route::Home)
        );
    }

    #[test]
    fn anonymous_on_admin_route_goes_to_login() {
        assert_eq!(
            decide(false, false, Route::Dashboard),
            Navigation::Redirect(Route::Login)
        );
    }

    #[test]
    fn non_admin_on_admin_route_goes_home() {
        assert_eq!(
            decide(true, false, Route::Projects),
            Navigation::Redirect(Route::Home)
        );
    }

    #[test]
    fn allowed_navigations() {
        assert_eq!(decide(false, false, Route::Home), Navigation::Allow);
        assert_eq!(decide(true, false, Route::Home), Navigation::Allow);
        assert_eq!(decide(false, false, Route::Login), Navigation::Allow);
        for route in [Route::Dashboard, Route::Skills, Route::Settings] {
            assert_eq!(decide(true, true, route), Navigation::Allow);
        }
    }

    #[test]
    fn decisions_over_every_route_and_role() {
        for route in Route::ALL {
            for (auth, admin) in [(false, false), (true, false), (true, true)] {
                match decide(auth, admin, route) {
                    Navigation::Allow => {
                        let meta = route.meta();
                        assert!(!(meta.guest_only && auth));
                        assert!(!meta.requires_auth || auth);
                        assert!(!meta.requires_admin || admin);
                    }
                    Navigation::Redirect(to) => {
                        // a redirect target never redirects again for the same user
                        assert_eq!(decide(auth, admin, to), Navigation::Allow, "{route} -> {to}");
                    }
                }
            }
        }
    }

    fn guard(provider: StubProvider) -> (RouteGuard, Arc<AuthStore>, Arc<RecordingNavigator>) {
        let store = Arc::new(MemoryTokenStore::new());
        let navigator = Arc::new(RecordingNavigator::new());
        let session = SessionClient::new(Arc::new(provider), store.clone(), navigator.clone());
        let auth = Arc::new(AuthStore::new(session, store));
        (RouteGuard::new(auth.clone()), auth, navigator)
    }

    #[tokio::test]
    async fn guard_initializes_before_deciding() {
        let (guard, auth, navigator) = guard(StubProvider::new());
        assert!(!auth.is_initialized());

        assert_eq!(
            guard.before_each(Route::Dashboard).await,
            Navigation::Redirect(Route::Login)
        );
        assert!(auth.is_initialized());
        assert_eq!(navigator.silent_checks(), 1);

        guard.before_each(Route::Home).await;
        assert_eq!(navigator.silent_checks(), 1);
    }

    #[tokio::test]
    async fn guard_follows_login() {
        let (guard, auth, _) = guard(StubProvider::new().with_user("admin", "admin", &["ADMIN"]));
        auth.login_with_credentials("admin", &Secret::from("admin"))
            .await
            .unwrap();

        assert_eq!(guard.before_each(Route::Projects).await, Navigation::Allow);
        assert_eq!(
            guard.before_each(Route::Login).await,
            Navigation::Redirect(Route::Dashboard)
        );
    }
}
