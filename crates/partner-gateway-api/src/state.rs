//! Shared application state the dispatcher hands to every handler. The
//! Control API has no logic of its own beyond input validation and response
//! shaping: every handler is a thin call onto one of these.

use partner_gateway_routes::RouteManager;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteManager>,
}

impl AppState {
    pub fn new(routes: Arc<RouteManager>) -> Self {
        Self { routes }
    }
}
