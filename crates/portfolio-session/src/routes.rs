//! Application routes and their access requirements

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    Login,
    Register,
    Dashboard,
    Projects,
    Skills,
    Experience,
    Settings,
}

/// Access requirements attached to a route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteMeta {
    /// Only reachable while signed out (login, register)
    pub guest_only: bool,
    pub requires_auth: bool,
    pub requires_admin: bool,
}

const GUEST: RouteMeta = RouteMeta {
    guest_only: true,
    requires_auth: false,
    requires_admin: false,
};

const ADMIN: RouteMeta = RouteMeta {
    guest_only: false,
    requires_auth: true,
    requires_admin: true,
};

impl Route {
    pub const ALL: [Route; 8] = [
        Route::Home,
        Route::Login,
        Route::Register,
        Route::Dashboard,
        Route::Projects,
        Route::Skills,
        Route::Experience,
        Route::Settings,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Route::Home => "home",
            Route::Login => "login",
            Route::Register => "register",
            Route::Dashboard => "dashboard",
            Route::Projects => "projects",
            Route::Skills => "skills",
            Route::Experience => "experience",
            Route::Settings => "settings",
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Login => "/login",
            Route::Register => "/register",
            Route::Dashboard => "/dashboard",
            Route::Projects => "/projects",
            Route::Skills => "/skills",
            Route::Experience => "/experience",
            Route::Settings => "/settings",
        }
    }

    pub fn meta(self) -> RouteMeta {
        match self {
            Route::Home => RouteMeta::default(),
            Route::Login | Route::Register => GUEST,
            Route::Dashboard
            | Route::Projects
            | Route::Skills
            | Route::Experience
            | Route::Settings => ADMIN,
        }
    }

    /// Match a location path. Query, fragment and a trailing slash are
    /// ignored.
    pub fn from_path(path: &str) -> Option<Route> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        let normalized = if trimmed.is_empty() { "/" } else { trimmed };
        Route::ALL.into_iter().find(|r| r.path() == normalized)
    }

    pub fn from_name(name: &str) -> Option<Route> {
        Route::ALL.into_iter().find(|r| r.name() == name)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}
