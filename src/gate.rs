//! Route table and the access decision made before any view renders.

use tracing::debug;

use crate::models::Role;
use crate::session::AuthState;

pub const LOGIN_ROUTE: &str = "/login";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Roles(&'static [Role]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Login,
    NewReport,
    Dashboard,
    ReportDetails,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMatch {
    Page { view: View, access: Access, param: Option<String> },
    /// `/` and every unknown path.
    CatchAll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Status(&'static str),
    Redirect(&'static str),
    Render,
}

const REPORTER_ONLY: &[Role] = &[Role::Reporter];
const ADMIN_ONLY: &[Role] = &[Role::Admin];

pub fn match_route(path: &str) -> RouteMatch {
    let trimmed = path.trim_end_matches('/');
    let page = |view, access| RouteMatch::Page {
        view,
        access,
        param: None,
    };

    match trimmed {
        "/login" => page(View::Login, Access::Public),
        "/report/new" => page(View::NewReport, Access::Roles(REPORTER_ONLY)),
        "/admin" => page(View::Dashboard, Access::Roles(ADMIN_ONLY)),
        _ => match trimmed.strip_prefix("/admin/reports/") {
            Some(id) if !id.is_empty() && !id.contains('/') => RouteMatch::Page {
                view: View::ReportDetails,
                access: Access::Roles(ADMIN_ONLY),
                param: Some(id.to_string()),
            },
            _ => RouteMatch::CatchAll,
        },
    }
}

/// Total over every combination of auth state and route access.
pub fn decide(state: &AuthState, access: Access) -> GateDecision {
    if state.loading {
        return GateDecision::Status(match access {
            Access::Public => "Loading…",
            Access::Roles(_) => "Authenticating…",
        });
    }

    match access {
        Access::Public => match (state.signed_in(), state.role) {
            (true, Some(role)) => GateDecision::Redirect(role.entry_route()),
            _ => GateDecision::Render,
        },
        Access::Roles(allowed) => match state.role {
            Some(role) if state.signed_in() && allowed.contains(&role) => GateDecision::Render,
            _ => GateDecision::Redirect(LOGIN_ROUTE),
        },
    }
}

/// Matches `path` and decides what to show for it.
pub fn navigate(state: &AuthState, path: &str) -> (RouteMatch, GateDecision) {
    let route = match_route(path);
    let decision = match &route {
        RouteMatch::CatchAll => GateDecision::Redirect(LOGIN_ROUTE),
        RouteMatch::Page { access, .. } => decide(state, *access),
    };
    debug!(path, ?decision, "route decision");
    (route, decision)
}
