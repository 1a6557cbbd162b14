//! Feature-boundary behaviour of the message consumer subscriber.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How the consumer subscriber treats the consumer daemon at feature
/// boundaries.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ConsumerMode {
    /// The subscriber is not registered; the queue isolator owns the consumer.
    #[default]
    Off,
    /// Start the consumer when a feature begins and stop it when it ends.
    Stop,
    /// Restart the consumer when each feature begins and leave it running.
    Restart,
}

/// Errors encountered while parsing a [`ConsumerMode`] from text.
pub type ConsumerModeParseError = strum::ParseError;
