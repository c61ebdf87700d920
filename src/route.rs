// ABOUTME: Groups sub-routes sharing a route id; dispatches async (queue) or sync (direct submit)
// ABOUTME: Route::submit has no literal upstream implementation; synthesized from the worker routing pattern

use crate::models::{self, Sms};
use crate::queue::QueueAdapter;
use crate::subroute::SubRoute;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route {0} has no sub-routes")]
    Empty(String),
    #[error("can't route message: no active sub-route for {0}")]
    NoActiveRoute(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// The outcome of a successful dispatch: queued (async mode returns `None`) or
/// a direct-submit acknowledgment (sync mode).
pub enum DispatchOutcome {
    Queued,
    Acked(models::Ack),
}

/// A group of sub-routes sharing one route id, dispatching either asynchronously
/// (publish to the bus) or synchronously (direct SMPP submit on an active member).
pub struct Route {
    pub id: String,
    sub_routes: Vec<Arc<SubRoute>>,
    asynchronous: bool,
    queue: QueueAdapter,
    rng: Mutex<StdRng>,
}

impl Route {
    /// `asynchronous` is the negation of the first sub-route's `synchronous`
    /// setting; all sub-routes under one route share it by construction.
    pub fn new(
        id: String,
        sub_routes: Vec<Arc<SubRoute>>,
        asynchronous: bool,
        queue: QueueAdapter,
    ) -> Result<Self, RouteError> {
        if sub_routes.is_empty() {
            return Err(RouteError::Empty(id));
        }
        Ok(Self {
            id,
            sub_routes,
            asynchronous,
            queue,
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    pub fn sub_routes(&self) -> &[Arc<SubRoute>] {
        &self.sub_routes
    }

    /// Async mode is always "active" because queuing only requires the bus to
    /// be reachable; sync mode is active iff at least one sub-route is.
    pub fn is_active(&self) -> bool {
        if self.asynchronous {
            true
        } else {
            self.sub_routes.iter().any(|s| s.is_active())
        }
    }

    pub async fn submit(&self, sms: Sms) -> Result<DispatchOutcome, RouteError> {
        if self.asynchronous {
            let payload =
                serde_json::to_vec(&sms).map_err(|e| RouteError::Transport(e.to_string()))?;
            self.queue
                .publish(&models::sms_send_subject(&self.id), payload.into())
                .await
                .map_err(|e| RouteError::Transport(e.to_string()))?;
            return Ok(DispatchOutcome::Queued);
        }

        for _ in 0..attempt_budget(self.sub_routes.len()) {
            let candidate = self.pick_sub_route().await;
            if !candidate.is_active() {
                continue;
            }

            let correlation_id = if sms.message_id.is_empty() {
                None
            } else {
                Some(sms.message_id.as_str())
            };
            let smsc_id = candidate
                .submit_direct(&sms.from, &sms.to, &sms.data, correlation_id)
                .await
                .map_err(|e| RouteError::Transport(e.to_string()))?;

            return Ok(DispatchOutcome::Acked(models::Ack {
                from: sms.from,
                to: sms.to,
                message_id: sms.message_id,
                route_id: self.id.clone(),
                smsc_id,
                smsc_status: "Submitted".to_string(),
            }));
        }

        Err(RouteError::NoActiveRoute(self.id.clone()))
    }

    async fn pick_sub_route(&self) -> Arc<SubRoute> {
        if self.sub_routes.len() == 1 {
            return self.sub_routes[0].clone();
        }
        let idx = {
            let mut rng = self.rng.lock().await;
            rng.gen_range(0..self.sub_routes.len())
        };
        self.sub_routes[idx].clone()
    }
}

/// Attempt budget for random sub-route selection: `2 * N`, not de-duplicated.
fn attempt_budget(sub_route_count: usize) -> usize {
    2 * sub_route_count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_budget_is_twice_the_sub_route_count() {
        assert_eq!(attempt_budget(1), 2);
        assert_eq!(attempt_budget(3), 6);
    }

    #[test]
    fn seeded_rng_picks_within_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let idx = rng.gen_range(0..5usize);
            assert!(idx < 5);
        }
    }
}
