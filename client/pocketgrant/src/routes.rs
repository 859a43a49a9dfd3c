//! User-facing page routes.

use std::fmt;

use serde::Serialize;

use crate::types::ProgramMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "page", content = "program_id", rename_all = "snake_case")]
pub enum Route {
    Home,
    CreateProgram,
    ClaimHub,
    ClaimById(u64),
    GiftById(u64),
    RequestHub,
    RequestById(u64),
    ProviderDashboard,
    ProviderCreate,
    AdminVerify,
    Donate,
}

impl Route {
    /// Parse a path such as `/gift/3?ref=x`. Program ids start at 1.
    pub fn parse(path: &str) -> Option<Route> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let id = |s: &str| s.parse::<u64>().ok().filter(|id| *id >= 1);
        match segments.as_slice() {
            [] => Some(Route::Home),
            ["create"] => Some(Route::CreateProgram),
            ["claim"] => Some(Route::ClaimHub),
            ["claim", n] => id(*n).map(Route::ClaimById),
            ["gift", n] => id(*n).map(Route::GiftById),
            ["request"] => Some(Route::RequestHub),
            ["request", n] => id(*n).map(Route::RequestById),
            ["provider"] => Some(Route::ProviderDashboard),
            ["provider", "create"] => Some(Route::ProviderCreate),
            ["admin"] => Some(Route::AdminVerify),
            ["donate"] => Some(Route::Donate),
            _ => None,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::CreateProgram => "/create".to_string(),
            Route::ClaimHub => "/claim".to_string(),
            Route::ClaimById(id) => format!("/claim/{id}"),
            Route::GiftById(id) => format!("/gift/{id}"),
            Route::RequestHub => "/request".to_string(),
            Route::RequestById(id) => format!("/request/{id}"),
            Route::ProviderDashboard => "/provider".to_string(),
            Route::ProviderCreate => "/provider/create".to_string(),
            Route::AdminVerify => "/admin".to_string(),
            Route::Donate => "/donate".to_string(),
        }
    }

    pub fn program_id(&self) -> Option<u64> {
        match self {
            Route::ClaimById(id) | Route::GiftById(id) | Route::RequestById(id) => Some(*id),
            _ => None,
        }
    }

    /// Detail page a beneficiary should land on for a program of `mode`.
    pub fn for_program(id: u64, mode: ProgramMode) -> Route {
        match mode {
            ProgramMode::Request => Route::RequestById(id),
            ProgramMode::InstantRandomClaim => Route::ClaimById(id),
            ProgramMode::GiftCode => Route::GiftById(id),
        }
    }

    /// Gift and request pages only serve their own mode; anything else is
    /// sent to the generic claim page.
    pub fn redirect_for(&self, mode: ProgramMode) -> Option<Route> {
        match (*self, mode) {
            (Route::GiftById(id), m) if m != ProgramMode::GiftCode => Some(Route::ClaimById(id)),
            (Route::RequestById(id), m) if m != ProgramMode::Request => Some(Route::ClaimById(id)),
            _ => None,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
