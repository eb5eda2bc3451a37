mod feedback;
mod handler;
mod sns;

pub mod init;
pub mod message;

#[cfg(test)]
pub use feedback::InteractionPayload;
pub use handler::Handler;
#[cfg(test)]
pub use sns::SnsNotification;
