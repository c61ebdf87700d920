pub mod codec;
pub mod config;
pub mod datatypes;
pub mod errors;
pub mod http;
pub(crate) mod macros;
pub mod models;
pub mod queue;
pub mod route;
pub mod server;
pub mod session;
pub mod subroute;

// Re-export codec types for direct access
pub use codec::{CodecError, Decodable, Encodable, Frame, PduHeader, PduRegistry};

// Re-export the session-level gateway API
pub use session::{BindMode, ConnStatus, InboundEvent, Session, SessionConfig, SessionError};

/// Error returned by most functions.
///
/// When writing a real application, one might want to consider a specialized
/// error handling crate or defining an error type as an `enum` of causes.
/// However, for our example, using a boxed `std::error::Error` is sufficient.
///
/// For performance reasons, boxing is avoided in any hot path. For example, in
/// `parse`, a custom error `enum` is defined. This is because the error is hit
/// and handled during normal execution when a partial frame is received on a
/// socket. `std::error::Error` is implemented for `parse::Error` which allows
/// it to be converted to `Box<dyn std::error::Error>`.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type for SMPP operations.
///
/// This is defined as a convenience.
///
/// # Examples
///
/// Binding a transceiver session and submitting a message:
///
/// ```rust,no_run
/// use smpp::session::{BindMode, Session, SessionConfig};
/// use smpp::datatypes::{TypeOfNumber, NumericPlanIndicator};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let session = Session::new(SessionConfig {
///         address: "localhost:2775".to_string(),
///         system_id: "system_id".to_string(),
///         password: "password".to_string(),
///         system_type: String::new(),
///         bind_mode: BindMode::Transceiver,
///         source_ton: TypeOfNumber::Alphanumeric,
///         source_npi: NumericPlanIndicator::Unknown,
///         destination_ton: TypeOfNumber::International,
///         destination_npi: NumericPlanIndicator::Isdn,
///         registered_delivery: 1,
///         disable_tlv_options: false,
///     });
///
///     let mut status_rx = session.bind().await;
///     status_rx.recv().await; // wait for Connected
///
///     let message_id = session
///         .submit("1234567890", "0987654321", "Hello, World!", None)
///         .await?;
///     println!("Message sent with ID: {}", message_id);
///
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;
