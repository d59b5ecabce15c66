use thiserror::Error;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to connect to broker before startup timeout after {attempts} failed attempt(s): {last_error}")]
    InitialConnect { attempts: u32, last_error: String },

    #[error("Broker transport error: {0}")]
    Transport(String),

    #[error("Broker refused the connection")]
    ConnectionRefused,

    #[error("Failed to request subscription: {0}")]
    Subscribe(String),

    #[error("Failed to disconnect from broker: {0}")]
    Disconnect(String),
}
