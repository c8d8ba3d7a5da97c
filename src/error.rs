use thiserror::Error;

pub type Result<T> = std::result::Result<T, BillingError>;

#[derive(Error, Debug)]
pub enum BillingError {
    /// Binding to the remote billing service was refused, typically a
    /// security or permission rejection. The attempt is terminal; queued
    /// requests stay queued until the next submission triggers a new bind.
    #[error("could not bind to remote billing service: {0}")]
    BindRejected(String),
    /// A remote call failed mid-flight, e.g. the remote process died between
    /// the handle check and the call.
    #[error("remote billing service call failed: {0}")]
    RemoteCallFailure(String),
}
