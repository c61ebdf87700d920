// ABOUTME: SMPP session lifecycle — bind, reconnect-aware status stream, PDU submit and dispatch
// ABOUTME: Built directly on the codec's PduRegistry/Frame, not the legacy client/connection pair

use crate::codec::{Decodable, Encodable, Frame, PduHeader, PduRegistry};
use crate::datatypes::{
    BindTransceiver, BindTransmitter, CommandId, CommandStatus, DestinationAddr,
    NumericPlanIndicator, ScheduleDeliveryTime, ServiceType, ShortMessage, SourceAddr, SubmitSm,
    TypeOfNumber, ValidityPeriod,
};
use bytes::{Bytes, BytesMut};
use std::io::Cursor;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace, warn};

/// Errors at the codec/transport boundary, distinct from the gateway-level taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Protocol error: {0:?}")]
    Protocol(CommandStatus),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Operation timeout")]
    Timeout,

    #[error("Unexpected PDU: expected {expected}, got {actual:?}")]
    UnexpectedPdu { expected: String, actual: CommandId },

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,
}

/// Bind mode requested of the SMSC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    Transmitter,
    Transceiver,
}

/// Status emitted on the session's connection stream.
#[derive(Debug)]
pub enum ConnStatus {
    Connected,
    Disconnected,
    ConnectionFailed(SessionError),
    BindFailed(SessionError),
}

/// Credentials and addressing defaults needed to bind and submit.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub address: String,
    pub system_id: String,
    pub password: String,
    pub system_type: String,
    pub bind_mode: BindMode,
    pub source_ton: TypeOfNumber,
    pub source_npi: NumericPlanIndicator,
    pub destination_ton: TypeOfNumber,
    pub destination_npi: NumericPlanIndicator,
    pub registered_delivery: u8,
    pub disable_tlv_options: bool,
}

/// An inbound PDU handed to a registered handler (transceiver mode only).
#[derive(Debug)]
pub enum InboundEvent {
    DeliverSm(crate::datatypes::DeliverSm),
    DataSm(Box<crate::datatypes::DataSm>),
}

pub type HandlerFn = Arc<dyn Fn(InboundEvent) + Send + Sync>;

/// A bound SMPP v3.4 session: a background reader task feeding a connection-status
/// stream, and a write half guarded for submission.
pub struct Session {
    config: SessionConfig,
    write_half: Arc<Mutex<Option<tokio::net::tcp::OwnedWriteHalf>>>,
    sequence_number: Arc<std::sync::atomic::AtomicU32>,
    handler: Arc<Mutex<Option<HandlerFn>>>,
    pending_responses: Arc<Mutex<std::collections::HashMap<u32, mpsc::Sender<Frame>>>>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            write_half: Arc::new(Mutex::new(None)),
            sequence_number: Arc::new(std::sync::atomic::AtomicU32::new(1)),
            handler: Arc::new(Mutex::new(None)),
            pending_responses: Arc::new(Mutex::new(std::collections::HashMap::new())),
        }
    }

    /// Register a handler for inbound PDUs. Only meaningful in transceiver mode; the
    /// handler runs on a dedicated dispatch task, never inline in the read loop.
    pub async fn set_handler(&self, handler: HandlerFn) {
        *self.handler.lock().await = Some(handler);
    }

    fn next_sequence(&self) -> u32 {
        self.sequence_number
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }

    /// Connect, bind, and start the background reader. Returns a stream of connection
    /// statuses that keeps running across individual failures so a caller's reconnect
    /// loop has something to observe.
    pub async fn bind(&self) -> mpsc::Receiver<ConnStatus> {
        let (status_tx, status_rx) = mpsc::channel(16);
        let config = self.config.clone();
        let write_half = self.write_half.clone();
        let handler = self.handler.clone();
        let pending_responses = self.pending_responses.clone();
        let sequence_number = self.sequence_number.clone();

        tokio::spawn(async move {
            match Self::connect_and_bind(&config, &sequence_number).await {
                Ok((read_half, write_stream)) => {
                    *write_half.lock().await = Some(write_stream);
                    let _ = status_tx.send(ConnStatus::Connected).await;
                    Self::read_loop(
                        read_half,
                        handler,
                        pending_responses,
                        status_tx.clone(),
                    )
                    .await;
                    *write_half.lock().await = None;
                    let _ = status_tx.send(ConnStatus::Disconnected).await;
                }
                Err(e) => {
                    let _ = status_tx.send(ConnStatus::BindFailed(e)).await;
                }
            }
        });

        status_rx
    }

    async fn connect_and_bind(
        config: &SessionConfig,
        sequence_number: &std::sync::atomic::AtomicU32,
    ) -> Result<(tokio::net::tcp::OwnedReadHalf, tokio::net::tcp::OwnedWriteHalf), SessionError>
    {
        let stream = TcpStream::connect(&config.address)
            .await
            .map_err(SessionError::Connection)?;
        let (mut read_half, mut write_half) = stream.into_split();

        let seq = sequence_number.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let bind_bytes = Self::build_bind_frame(config, seq)?;
        write_half
            .write_all(&bind_bytes)
            .await
            .map_err(SessionError::Connection)?;

        let header = Self::read_header(&mut read_half).await?;
        let body = Self::read_body(&mut read_half, &header).await?;
        let mut cursor = Cursor::new(body.as_ref());
        let registry = PduRegistry::new();
        let frame = registry
            .decode_pdu(header, &mut cursor)
            .map_err(|e| SessionError::InvalidData(e.to_string()))?;

        match frame {
            Frame::BindTransmitterResp(resp) if resp.command_status == CommandStatus::Ok => {
                Ok((read_half, write_half))
            }
            Frame::BindTransceiverResp(resp) if resp.command_status == CommandStatus::Ok => {
                Ok((read_half, write_half))
            }
            Frame::BindTransmitterResp(resp) | Frame::BindTransceiverResp(resp) => {
                Err(SessionError::Protocol(resp.command_status))
            }
            other => Err(SessionError::UnexpectedPdu {
                expected: "BindResponse".to_string(),
                actual: other.command_id(),
            }),
        }
    }

    fn build_bind_frame(config: &SessionConfig, seq: u32) -> Result<Bytes, SessionError> {
        let system_id = crate::datatypes::SystemId::from(config.system_id.as_str());
        let password = Some(crate::datatypes::Password::from(config.password.as_str()));
        let system_type = crate::datatypes::SystemType::from(config.system_type.as_str());

        let mut buf = BytesMut::new();
        match config.bind_mode {
            BindMode::Transmitter => {
                let pdu = BindTransmitter {
                    command_status: CommandStatus::Ok,
                    sequence_number: seq,
                    system_id,
                    password,
                    system_type,
                    interface_version: crate::datatypes::InterfaceVersion::SmppV34,
                    addr_ton: config.source_ton,
                    addr_npi: config.source_npi,
                    address_range: crate::datatypes::AddressRange::default(),
                };
                pdu.encode(&mut buf)
                    .map_err(|e| SessionError::InvalidData(e.to_string()))?;
            }
            BindMode::Transceiver => {
                let pdu = BindTransceiver {
                    command_status: CommandStatus::Ok,
                    sequence_number: seq,
                    system_id,
                    password,
                    system_type,
                    interface_version: crate::datatypes::InterfaceVersion::SmppV34,
                    addr_ton: config.source_ton,
                    addr_npi: config.source_npi,
                    address_range: crate::datatypes::AddressRange::default(),
                };
                pdu.encode(&mut buf)
                    .map_err(|e| SessionError::InvalidData(e.to_string()))?;
            }
        }
        Ok(buf.freeze())
    }

    async fn read_header(
        read_half: &mut tokio::net::tcp::OwnedReadHalf,
    ) -> Result<PduHeader, SessionError> {
        let mut header_bytes = [0u8; PduHeader::SIZE];
        read_half
            .read_exact(&mut header_bytes)
            .await
            .map_err(SessionError::Connection)?;
        let mut cursor = Cursor::new(&header_bytes[..]);
        PduHeader::decode(&mut cursor).map_err(|e| SessionError::InvalidData(e.to_string()))
    }

    async fn read_body(
        read_half: &mut tokio::net::tcp::OwnedReadHalf,
        header: &PduHeader,
    ) -> Result<Bytes, SessionError> {
        let body_len = header.command_length as usize - PduHeader::SIZE;
        let mut body = vec![0u8; body_len];
        if body_len > 0 {
            read_half
                .read_exact(&mut body)
                .await
                .map_err(SessionError::Connection)?;
        }
        Ok(Bytes::from(body))
    }

    async fn read_loop(
        mut read_half: tokio::net::tcp::OwnedReadHalf,
        handler: Arc<Mutex<Option<HandlerFn>>>,
        pending_responses: Arc<Mutex<std::collections::HashMap<u32, mpsc::Sender<Frame>>>>,
        status_tx: mpsc::Sender<ConnStatus>,
    ) {
        let registry = PduRegistry::new();
        loop {
            let header = match Self::read_header(&mut read_half).await {
                Ok(h) => h,
                Err(e) => {
                    debug!(error = %e, "session read loop ended");
                    let _ = status_tx.try_send(ConnStatus::ConnectionFailed(e));
                    return;
                }
            };
            let body = match Self::read_body(&mut read_half, &header).await {
                Ok(b) => b,
                Err(e) => {
                    let _ = status_tx.try_send(ConnStatus::ConnectionFailed(e));
                    return;
                }
            };
            let mut cursor = Cursor::new(body.as_ref());
            let frame = match registry.decode_pdu(header, &mut cursor) {
                Ok(f) => f,
                Err(e) => {
                    warn!(error = %e, "discarding malformed frame");
                    continue;
                }
            };

            trace!(command_id = ?frame.command_id(), "received frame");

            let seq = frame.sequence_number();
            let maybe_waiter = pending_responses.lock().await.remove(&seq);
            if let Some(waiter) = maybe_waiter {
                let _ = waiter.send(frame).await;
                continue;
            }

            Self::dispatch_inbound(frame, &handler).await;
        }
    }

    async fn dispatch_inbound(frame: Frame, handler: &Arc<Mutex<Option<HandlerFn>>>) {
        let event = match frame {
            Frame::DeliverSm(pdu) => Some(InboundEvent::DeliverSm(*pdu)),
            Frame::DataSm(pdu) => Some(InboundEvent::DataSm(pdu)),
            Frame::EnquireLink(_) => None,
            _ => None,
        };
        if let Some(event) = event {
            let guard = handler.lock().await;
            if let Some(handler) = guard.as_ref() {
                let handler = handler.clone();
                tokio::spawn(async move {
                    handler(event);
                });
            }
        }
    }

    /// Build and submit a SUBMIT_SM, returning the SMSC-assigned message id.
    pub async fn submit(
        &self,
        from: &str,
        to: &str,
        text: &str,
        correlation_id: Option<&str>,
    ) -> Result<String, SessionError> {
        let seq = self.next_sequence();

        let source_addr = SourceAddr::new(from, self.config.source_ton)
            .map_err(|e| SessionError::InvalidData(e.to_string()))?;
        let destination_addr = DestinationAddr::new(to, self.config.destination_ton)
            .map_err(|e| SessionError::InvalidData(e.to_string()))?;
        let short_message = ShortMessage::new(text.as_bytes())
            .map_err(|e| SessionError::InvalidData(e.to_string()))?;

        let mut pdu = SubmitSm {
            command_status: CommandStatus::Ok,
            sequence_number: seq,
            service_type: ServiceType::default(),
            source_addr_ton: self.config.source_ton,
            source_addr_npi: self.config.source_npi,
            source_addr,
            dest_addr_ton: self.config.destination_ton,
            dest_addr_npi: self.config.destination_npi,
            destination_addr,
            esm_class: 0,
            protocol_id: 0,
            priority_flag: 0,
            schedule_delivery_time: ScheduleDeliveryTime::new("")
                .map_err(|e| SessionError::InvalidData(e.to_string()))?,
            validity_period: ValidityPeriod::new("")
                .map_err(|e| SessionError::InvalidData(e.to_string()))?,
            registered_delivery: self.config.registered_delivery,
            replace_if_present_flag: 0,
            data_coding: 0,
            sm_default_msg_id: 0,
            sm_length: short_message.len() as u8,
            short_message,
            user_message_reference: None,
            source_port: None,
            source_addr_submit: None,
            destination_port: None,
            dest_addr_submit: None,
            sar_msg_ref_num: None,
            sar_total_segments: None,
            sar_segment_seqnum: None,
            more_messages_to_send: None,
            payload_type: None,
            message_payload: None,
            privacy_indicator: None,
            callback_num: None,
            callback_num_pres_ind: None,
            callback_num_atag: None,
            source_subaddress: None,
            dest_subaddress: None,
            display_time: None,
            sms_signal: None,
            ms_validity: None,
            ms_msg_wait_facilities: None,
            number_of_messages: None,
            alert_on_msg_delivery: None,
            language_indicator: None,
            its_reply_type: None,
            its_session_info: None,
            ussd_service_op: None,
            receipted_message_id: None,
        };

        if let (Some(id), false) = (correlation_id, self.config.disable_tlv_options) {
            pdu = pdu.with_tracking_id(id);
        }

        let mut buf = BytesMut::new();
        pdu.encode(&mut buf)
            .map_err(|e| SessionError::InvalidData(e.to_string()))?;

        let (tx, mut rx) = mpsc::channel(1);
        self.pending_responses.lock().await.insert(seq, tx);

        {
            let mut guard = self.write_half.lock().await;
            let write_half = guard.as_mut().ok_or(SessionError::ConnectionClosed)?;
            write_half
                .write_all(&buf)
                .await
                .map_err(SessionError::Connection)?;
        }

        let response = tokio::time::timeout(std::time::Duration::from_secs(30), rx.recv())
            .await
            .map_err(|_| SessionError::Timeout)?
            .ok_or(SessionError::ConnectionClosed)?;

        match response {
            Frame::SubmitSmResp(resp) if resp.command_status == CommandStatus::Ok => {
                Ok(resp.message_id.as_str().unwrap_or("").to_string())
            }
            Frame::SubmitSmResp(resp) => Err(SessionError::Protocol(resp.command_status)),
            other => Err(SessionError::UnexpectedPdu {
                expected: "SubmitSmResponse".to_string(),
                actual: other.command_id(),
            }),
        }
    }

    /// Send an enquire_link keep-alive and wait for its response.
    pub async fn enquire_link(&self) -> Result<(), SessionError> {
        let seq = self.next_sequence();
        let pdu = crate::datatypes::EnquireLink::new(seq);
        let mut buf = BytesMut::new();
        pdu.encode(&mut buf)
            .map_err(|e| SessionError::InvalidData(e.to_string()))?;

        let (tx, mut rx) = mpsc::channel(1);
        self.pending_responses.lock().await.insert(seq, tx);

        {
            let mut guard = self.write_half.lock().await;
            let write_half = guard.as_mut().ok_or(SessionError::ConnectionClosed)?;
            write_half
                .write_all(&buf)
                .await
                .map_err(SessionError::Connection)?;
        }

        let response = tokio::time::timeout(std::time::Duration::from_secs(10), rx.recv())
            .await
            .map_err(|_| SessionError::Timeout)?
            .ok_or(SessionError::ConnectionClosed)?;

        match response {
            Frame::EnquireLinkResp(_) => Ok(()),
            other => Err(SessionError::UnexpectedPdu {
                expected: "EnquireLinkResponse".to_string(),
                actual: other.command_id(),
            }),
        }
    }
}
