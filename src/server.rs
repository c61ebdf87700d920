// ABOUTME: Route registry: loads active_routes, constructs Route/SubRoute trees, starts them
// ABOUTME: Route ids are unique and frozen for the lifetime of the server once constructed

use crate::config::Settings;
use crate::queue::QueueAdapter;
use crate::route::{Route, RouteError};
use crate::subroute::SubRoute;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub struct Server {
    routes: HashMap<String, Arc<Route>>,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl Server {
    /// Reads `active_routes`, constructs one [`Route`] per id from its
    /// `<id>.addresses` list (one sub-route per address, first-write-wins on
    /// duplicate ids), then starts every sub-route's bind loop concurrently.
    pub fn new(settings: &Settings, queue: QueueAdapter) -> Result<Self, RouteError> {
        let mut routes = HashMap::new();
        let mut sub_routes_by_route: Vec<(String, Vec<Arc<SubRoute>>, bool)> = Vec::new();

        for route_id in settings.active_routes() {
            if routes.contains_key(&route_id) {
                continue;
            }
            let route_settings = settings.route_settings(&route_id);
            let sub_routes: Vec<Arc<SubRoute>> = route_settings
                .addresses
                .iter()
                .map(|address| {
                    Arc::new(SubRoute::new(
                        route_settings.clone(),
                        address.clone(),
                        queue.clone(),
                    ))
                })
                .collect();
            let asynchronous = !route_settings.operates_synchronously;
            let route = Arc::new(Route::new(
                route_id.clone(),
                sub_routes.clone(),
                asynchronous,
                queue.clone(),
            )?);
            routes.insert(route_id.clone(), route);
            sub_routes_by_route.push((route_id, sub_routes, asynchronous));
        }

        let mut tasks = Vec::new();
        for (route_id, sub_routes, _) in sub_routes_by_route {
            for sub_route in sub_routes {
                info!(route_id = %route_id, "starting sub-route");
                tasks.push(tokio::spawn(async move { sub_route.run().await }));
            }
        }

        Ok(Self {
            routes,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn get(&self, id: &str) -> Option<Arc<Route>> {
        self.routes.get(id).cloned()
    }

    pub fn is_active(&self) -> bool {
        self.routes.values().any(|r| r.is_active())
    }

    /// Signals every sub-route to exit and awaits their tasks, so shutdown is
    /// deterministic.
    pub async fn stop(&self) {
        for route in self.routes.values() {
            for sub_route in route.sub_routes() {
                sub_route.stop();
            }
        }
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
    }
}
