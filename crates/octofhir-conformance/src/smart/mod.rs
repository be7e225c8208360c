//! SMART App Launch: endpoint discovery, the standalone launch sequence and
//! access checks with the token it yields.

pub mod discovery;
pub mod launch;
pub mod restricted;
pub mod scopes;
pub mod token;

pub use discovery::{DiscoveryError, SmartConfiguration, SmartEndpoints, discover_endpoints};
pub use launch::{LaunchError, LaunchSequence, LaunchState, RedirectParams, authorization_url};
pub use restricted::run_restricted;
pub use scopes::{ScopeError, grants_access, parse_scope_list};
pub use token::{TokenResponse, validate_token_headers, validate_token_response};
