// ABOUTME: Owns one SMPP session against one SMSC address; wires the MO/ACK/DLR/MT worker mesh
// ABOUTME: State machine Created -> Initializing -> (Connected <-> Disconnected/Failed) -> Exited

use crate::config::RouteSettings;
use crate::models::{
    self, Ack, Dlr, Sms,
};
use crate::queue::{QueueAdapter, QueueMessage, SubscribeOptions, SubscriptionHandle};
use crate::session::{ConnStatus, InboundEvent, Session, SessionConfig};
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, warn};

const ACK_WAIT: Duration = Duration::from_secs(60);
const RECONNECT_SLEEP: Duration = Duration::from_secs(300);

fn dlr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"id:(?P<id>.*) sub:(?P<sub>.*) dlvrd:(?P<dlvrd>.*) submit date:(?P<submitdate>.*) done date:(?P<donedate>.*) stat:(?P<stat>.*) err:(?P<err>.*) text:(?P<text>.*)",
        )
        .expect("dlr regex is a compile-time constant")
    })
}

fn is_webhook_success(status: reqwest::StatusCode) -> bool {
    (200..203).contains(&status.as_u16())
}

/// A single SMPP bind against one SMSC address, running its own reconnect loop
/// and four durable workers. Created once at server startup; torn down only
/// on an explicit [`stop`](SubRoute::stop) or process shutdown.
pub struct SubRoute {
    pub id: String,
    address: String,
    settings: RouteSettings,
    queue: QueueAdapter,
    http: reqwest::Client,
    active: AtomicBool,
    exit: Notify,
    current_session: tokio::sync::Mutex<Option<Arc<Session>>>,
}

impl SubRoute {
    pub fn new(settings: RouteSettings, address: String, queue: QueueAdapter) -> Self {
        Self {
            id: settings.route_id.clone(),
            address,
            settings,
            queue,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client config is valid"),
            active: AtomicBool::new(false),
            exit: Notify::new(),
            current_session: tokio::sync::Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Submits directly on the currently bound session (sync-mode dispatch).
    /// Fails if no session is connected right now.
    pub async fn submit_direct(
        &self,
        from: &str,
        to: &str,
        data: &str,
        message_id: Option<&str>,
    ) -> Result<String, crate::session::SessionError> {
        let session = self.current_session.lock().await.clone();
        match session {
            Some(session) => session.submit(from, to, data, message_id).await,
            None => Err(crate::session::SessionError::ConnectionClosed),
        }
    }

    /// Signals the bind loop to exit after its current status-stream iteration.
    pub fn stop(&self) {
        self.exit.notify_one();
    }

    fn can_queue(&self) -> bool {
        !self.settings.operates_synchronously
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            address: self.address.clone(),
            system_id: self.settings.user.clone(),
            password: self.settings.password.clone(),
            system_type: self.settings.system_type.clone(),
            bind_mode: self.settings.bind_type,
            source_ton: self.settings.source_ton,
            source_npi: self.settings.source_npi,
            destination_ton: self.settings.destination_ton,
            destination_npi: self.settings.destination_npi,
            registered_delivery: self.settings.dlr_level.registered_delivery(),
            disable_tlv_options: self.settings.disable_tlv_options,
        }
    }

    /// Runs the outer reconnect loop until [`stop`](SubRoute::stop) is called.
    pub async fn run(self: Arc<Self>) {
        info!(route_id = %self.id, address = %self.address, "starting sub-route");
        loop {
            tokio::select! {
                _ = self.exit.notified() => {
                    info!(route_id = %self.id, "sub-route exiting");
                    return;
                }
                _ = self.clone().start_iteration() => {}
            }

            tokio::select! {
                _ = self.exit.notified() => {
                    info!(route_id = %self.id, "sub-route exiting");
                    return;
                }
                _ = tokio::time::sleep(RECONNECT_SLEEP) => {
                    warn!(route_id = %self.id, "bind loop ended, retrying after reconnect sleep");
                }
            }
        }
    }

    async fn start_iteration(self: Arc<Self>) {
        let ack_sub = self.clone().subscribe_ack_out().await;
        let dlr_sub = self.clone().subscribe_dlr_out().await;
        let mt_sub = self.clone().subscribe_mt_out().await;

        let session = Arc::new(Session::new(self.session_config()));
        session.set_handler(self.clone().make_handler()).await;

        let mut status_rx = session.bind().await;
        let mut send_sub: Option<SubscriptionHandle> = None;

        while let Some(status) = status_rx.recv().await {
            match status {
                ConnStatus::Connected => {
                    if send_sub.is_none() {
                        send_sub = self.clone().subscribe_mo(session.clone()).await;
                    }
                    *self.current_session.lock().await = Some(session.clone());
                    self.active.store(true, Ordering::Release);
                    info!(route_id = %self.id, address = %self.address, "smpp session connected");
                }
                ConnStatus::Disconnected => {
                    if let Some(sub) = send_sub.take() {
                        sub.unsubscribe().await;
                    }
                    *self.current_session.lock().await = None;
                    self.active.store(false, Ordering::Release);
                    info!(route_id = %self.id, "smpp session disconnected");
                }
                ConnStatus::ConnectionFailed(err) => {
                    if let Some(sub) = send_sub.take() {
                        sub.unsubscribe().await;
                    }
                    *self.current_session.lock().await = None;
                    self.active.store(false, Ordering::Release);
                    warn!(route_id = %self.id, error = %err, "smpp connection failed");
                }
                ConnStatus::BindFailed(err) => {
                    if let Some(sub) = send_sub.take() {
                        sub.unsubscribe().await;
                    }
                    *self.current_session.lock().await = None;
                    self.active.store(false, Ordering::Release);
                    warn!(route_id = %self.id, error = %err, "smpp bind failed");
                }
            }
        }

        if let Some(sub) = send_sub.take() {
            sub.unsubscribe().await;
        }
        *self.current_session.lock().await = None;
        if let Some(sub) = ack_sub {
            sub.unsubscribe().await;
        }
        if let Some(sub) = dlr_sub {
            sub.unsubscribe().await;
        }
        if let Some(sub) = mt_sub {
            sub.unsubscribe().await;
        }
    }

    /// Builds the SMSC-originated PDU handler (transceiver mode only). Runs on a
    /// dedicated dispatch task per session, never inline in its read loop.
    fn make_handler(self: Arc<Self>) -> crate::session::HandlerFn {
        Arc::new(move |event: InboundEvent| {
            let this = self.clone();
            match event {
                InboundEvent::DeliverSm(pdu) => {
                    tokio::spawn(async move { this.handle_deliver_sm(pdu).await });
                }
                InboundEvent::DataSm(pdu) => {
                    tokio::spawn(async move { this.handle_data_sm(*pdu).await });
                }
            }
        })
    }

    async fn handle_deliver_sm(&self, pdu: crate::datatypes::DeliverSm) {
        let body = pdu.short_message.as_str().unwrap_or("").to_string();
        let mut dlr = Dlr {
            from: pdu.source_addr.as_str().unwrap_or("").to_string(),
            to: pdu.destination_addr.as_str().unwrap_or("").to_string(),
            route_id: self.id.clone(),
            smsc_extra: body.clone(),
            ..Default::default()
        };

        if let Some(captures) = dlr_regex().captures(&body) {
            dlr.smsc_id = captures.name("id").map(|m| m.as_str().to_string()).unwrap_or_default();
            dlr.sub = captures.name("sub").map(|m| m.as_str().to_string()).unwrap_or_default();
            dlr.dlvrd = captures.name("dlvrd").map(|m| m.as_str().to_string()).unwrap_or_default();
            dlr.submitted_date = captures
                .name("submitdate")
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            dlr.done_date = captures
                .name("donedate")
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            dlr.smsc_status = captures.name("stat").map(|m| m.as_str().to_string()).unwrap_or_default();
            let err = captures.name("err").map(|m| m.as_str().to_string()).unwrap_or_default();
            let text = captures.name("text").map(|m| m.as_str().to_string()).unwrap_or_default();
            if self.settings.dlr_text_err_quirk {
                dlr.err = text;
            } else {
                dlr.err = err;
                dlr.text = text;
            }
        }

        if let Err(e) = self.route_dlr(dlr, self.can_queue()).await {
            warn!(route_id = %self.id, error = %e, "error occurred post processing dlr");
        }
    }

    async fn handle_data_sm(&self, pdu: crate::datatypes::DataSm) {
        let smsc_id = pdu
            .optional_parameters
            .iter()
            .find(|tlv| tlv.tag == crate::datatypes::tags::RECEIPTED_MESSAGE_ID)
            .and_then(|tlv| std::str::from_utf8(&tlv.value).ok())
            .unwrap_or("")
            .to_string();
        let data = pdu
            .optional_parameters
            .iter()
            .find(|tlv| tlv.tag == crate::datatypes::tags::MESSAGE_PAYLOAD)
            .and_then(|tlv| std::str::from_utf8(&tlv.value).ok())
            .unwrap_or("")
            .to_string();

        let sms = Sms {
            from: pdu.source_addr.as_str().unwrap_or("").to_string(),
            to: pdu.destination_addr.as_str().unwrap_or("").to_string(),
            data,
            message_id: String::new(),
            route_id: self.id.clone(),
            smsc_id,
            smsc_status: String::new(),
            smsc_extra: String::new(),
        };

        if let Err(e) = self.route_mt(sms, self.can_queue()).await {
            warn!(route_id = %self.id, error = %e, "error occurred post processing inbound message");
        }
    }

    async fn route_dlr(&self, dlr: Dlr, queue: bool) -> Result<(), String> {
        let payload = serde_json::to_vec(&dlr).map_err(|e| e.to_string())?;
        if queue {
            self.queue
                .publish(&models::sms_send_dlr_subject(&self.id), payload.into())
                .await
                .map_err(|e| e.to_string())
        } else {
            self.post_webhook(&self.settings.sms_send_dlr_url, payload).await
        }
    }

    async fn route_mt(&self, sms: Sms, queue: bool) -> Result<(), String> {
        let payload = serde_json::to_vec(&sms).map_err(|e| e.to_string())?;
        if queue {
            self.queue
                .publish(&models::sms_receive_subject(&self.id), payload.into())
                .await
                .map_err(|e| e.to_string())
        } else {
            self.post_webhook(&self.settings.sms_receive_url, payload).await
        }
    }

    async fn route_ack(&self, ack: Ack, queue: bool) -> Result<(), String> {
        let payload = serde_json::to_vec(&ack).map_err(|e| e.to_string())?;
        if queue {
            self.queue
                .publish(&models::sms_send_ack_subject(&self.id), payload.into())
                .await
                .map_err(|e| e.to_string())
        } else {
            self.post_webhook(&self.settings.sms_send_ack_url, payload).await
        }
    }

    async fn post_webhook(&self, url: &str, payload: Vec<u8>) -> Result<(), String> {
        let resp = self
            .http
            .post(url)
            .header("content-type", "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if is_webhook_success(resp.status()) {
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(format!("webhook returned {status}: {body}"))
        }
    }

    async fn subscribe_mo(self: Arc<Self>, session: Arc<Session>) -> Option<SubscriptionHandle> {
        let subject = models::sms_send_subject(&self.id);
        let opts = SubscribeOptions {
            durable_name: models::send_durable_name(&self.id),
            ack_wait: ACK_WAIT,
            max_inflight: self.settings.smsc_delivery_rate as usize,
        };
        let this = self.clone();
        self.queue
            .queue_subscribe(&subject, opts, move |message: QueueMessage| {
                let this = this.clone();
                let session = session.clone();
                async move { this.process_mo_message(message, session).await }
            })
            .await
            .map_err(|e| warn!(route_id = %self.id, error = %e, "failed to subscribe for MO events"))
            .ok()
    }

    async fn process_mo_message(&self, message: QueueMessage, session: Arc<Session>) {
        let sms: Sms = match serde_json::from_slice(&message.payload) {
            Ok(sms) => sms,
            Err(e) => {
                warn!(route_id = %self.id, error = %e, "error decoding message, hence dropping it");
                message.ack().await;
                return;
            }
        };

        let correlation_id = if self.settings.disable_tlv_options {
            None
        } else {
            Some(sms.message_id.as_str())
        };

        match session.submit(&sms.from, &sms.to, &sms.data, correlation_id).await {
            Ok(smsc_id) => {
                let ack = Ack {
                    from: sms.from,
                    to: sms.to,
                    message_id: sms.message_id,
                    route_id: self.id.clone(),
                    smsc_id,
                    smsc_status: "Submitted".to_string(),
                };
                if let Err(e) = self.route_ack(ack, self.can_queue()).await {
                    warn!(route_id = %self.id, error = %e, "failed to process ack, hence dropping it");
                }
                message.ack().await;
            }
            Err(e) => {
                info!(route_id = %self.id, message_id = %sms.message_id, error = %e, "rescheduling message for later");
            }
        }
    }

    async fn subscribe_ack_out(self: Arc<Self>) -> Option<SubscriptionHandle> {
        let subject = models::sms_send_ack_subject(&self.id);
        let opts = SubscribeOptions {
            durable_name: models::send_ack_durable_name(&self.id),
            ack_wait: ACK_WAIT,
            max_inflight: 50,
        };
        let this = self.clone();
        self.queue
            .queue_subscribe(&subject, opts, move |message: QueueMessage| {
                let this = this.clone();
                async move {
                    let ack: Ack = match serde_json::from_slice(&message.payload) {
                        Ok(ack) => ack,
                        Err(e) => {
                            warn!(route_id = %this.id, error = %e, "error decoding ack message, hence dropping it");
                            message.ack().await;
                            return;
                        }
                    };
                    match this.post_webhook(&this.settings.sms_send_ack_url, serde_json::to_vec(&ack).unwrap_or_default()).await {
                        Ok(()) => message.ack().await,
                        Err(e) => warn!(route_id = %this.id, error = %e, "error occurred posting ack to webhook"),
                    }
                }
            })
            .await
            .map_err(|e| warn!(route_id = %self.id, error = %e, "failed to subscribe for ack events"))
            .ok()
    }

    async fn subscribe_dlr_out(self: Arc<Self>) -> Option<SubscriptionHandle> {
        let subject = models::sms_send_dlr_subject(&self.id);
        let opts = SubscribeOptions {
            durable_name: models::receive_dlr_durable_name(&self.id),
            ack_wait: ACK_WAIT,
            max_inflight: 50,
        };
        let this = self.clone();
        self.queue
            .queue_subscribe(&subject, opts, move |message: QueueMessage| {
                let this = this.clone();
                async move {
                    let dlr: Dlr = match serde_json::from_slice(&message.payload) {
                        Ok(dlr) => dlr,
                        Err(e) => {
                            warn!(route_id = %this.id, error = %e, "error decoding dlr message, hence dropping it");
                            message.ack().await;
                            return;
                        }
                    };
                    match this.post_webhook(&this.settings.sms_send_dlr_url, serde_json::to_vec(&dlr).unwrap_or_default()).await {
                        Ok(()) => message.ack().await,
                        Err(e) => warn!(route_id = %this.id, error = %e, "error occurred posting dlr to webhook"),
                    }
                }
            })
            .await
            .map_err(|e| warn!(route_id = %self.id, error = %e, "failed to subscribe for dlr events"))
            .ok()
    }

    async fn subscribe_mt_out(self: Arc<Self>) -> Option<SubscriptionHandle> {
        let subject = models::sms_receive_subject(&self.id);
        let opts = SubscribeOptions {
            durable_name: models::receive_mt_durable_name(&self.id),
            ack_wait: ACK_WAIT,
            max_inflight: 50,
        };
        let this = self.clone();
        self.queue
            .queue_subscribe(&subject, opts, move |message: QueueMessage| {
                let this = this.clone();
                async move {
                    let sms: Sms = match serde_json::from_slice(&message.payload) {
                        Ok(sms) => sms,
                        Err(e) => {
                            warn!(route_id = %this.id, error = %e, "error decoding mt message, hence dropping it");
                            message.ack().await;
                            return;
                        }
                    };
                    match this.post_webhook(&this.settings.sms_receive_url, serde_json::to_vec(&sms).unwrap_or_default()).await {
                        Ok(()) => message.ack().await,
                        Err(e) => warn!(route_id = %this.id, error = %e, "error occurred posting mt to webhook"),
                    }
                }
            })
            .await
            .map_err(|e| warn!(route_id = %self.id, error = %e, "failed to subscribe for mt events"))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dlr_regex_extracts_named_captures() {
        let body = "id:abc sub:001 dlvrd:001 submit date:2401011200 done date:2401011201 stat:DELIVRD err:000 text:hi";
        let captures = dlr_regex().captures(body).unwrap();
        assert_eq!(&captures["id"], "abc");
        assert_eq!(&captures["stat"], "DELIVRD");
        assert_eq!(&captures["text"], "hi");
    }

    #[test]
    fn webhook_success_band_is_200_to_202() {
        assert!(is_webhook_success(reqwest::StatusCode::OK));
        assert!(is_webhook_success(reqwest::StatusCode::CREATED));
        assert!(is_webhook_success(reqwest::StatusCode::from_u16(202).unwrap()));
        assert!(!is_webhook_success(reqwest::StatusCode::from_u16(203).unwrap()));
        assert!(!is_webhook_success(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
    }
}
