//! Application-facing auth state, API pipeline and navigation guard
//!
//! Built on `portfolio-auth`:
//! - `AuthStore` publishes the observable auth state and drives the session
//! - `ApiClient` attaches fresh bearer tokens to backend calls and turns a
//!   401 into a login
//! - `RouteGuard` decides each navigation from the current state

pub mod api;
pub mod error;
pub mod guard;
pub mod metrics;
pub mod phase;
pub mod pipeline;
pub mod routes;
pub mod state;

pub use api::{Experience, ExperiencesApi, Project, ProjectsApi, Skill, SkillsApi};
pub use error::{ApiError, Result};
pub use guard::{Navigation, RouteGuard, decide};
pub use phase::{AuthEvent, AuthPhase};
pub use pipeline::{ApiClient, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
pub use routes::{Route, RouteMeta};
pub use state::{AuthSnapshot, AuthStore};
