use crate::entity::{filter_matches, CloudEntity};
use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub destination: String,
    pub nexthop: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Router {
    pub id: String,
    pub name: String,
    pub status: String,
    pub admin_state_up: bool,
    pub routes: Vec<Route>,
}

#[derive(Debug, Deserialize)]
pub struct RouterCreate {
    pub name: String,
    #[serde(default)]
    pub routes: Vec<Route>,
}

#[derive(Debug, Deserialize)]
pub struct RouterUpdate {
    pub name: Option<String>,
    pub routes: Option<Vec<Route>>,
}

fn check_routes(routes: &[Route]) -> Result<(), ApiError> {
    let mut seen = BTreeSet::new();
    for route in routes {
        if !route.destination.contains('/') || route.nexthop.parse::<std::net::IpAddr>().is_err() {
            return Err(ApiError::bad_request(format!("invalid route {route:?}")));
        }
        if !seen.insert((&route.destination, &route.nexthop)) {
            return Err(ApiError::bad_request(format!("duplicate route {route:?}")));
        }
    }
    Ok(())
}

#[async_trait]
impl CloudEntity for Router {
    const KIND: &'static str = "router";

    type Create = RouterCreate;
    type Update = RouterUpdate;
    type Action = ();
    type Context = ();

    fn from_create_params(id: String, params: RouterCreate) -> Result<Self, ApiError> {
        check_routes(&params.routes)?;
        Ok(Self {
            id,
            name: params.name,
            status: "ACTIVE".to_owned(),
            admin_state_up: true,
            routes: params.routes,
        })
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn set_status(&mut self, status: &str) {
        self.status = status.to_owned();
    }

    fn settled_status(&self) -> String {
        "ACTIVE".to_owned()
    }

    fn matches(&self, filter: &[(String, String)]) -> bool {
        filter_matches(filter, |key| match key {
            "id" => Some(self.id.as_str()),
            "name" => Some(self.name.as_str()),
            _ => None,
        })
    }

    async fn on_update(&mut self, update: RouterUpdate, _ctx: &()) -> Result<(), ApiError> {
        if let Some(routes) = update.routes {
            check_routes(&routes)?;
            self.routes = routes;
        }
        if let Some(name) = update.name {
            self.name = name;
        }
        Ok(())
    }
}
