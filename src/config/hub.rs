//! Connection hub configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Upper bound for either queue; larger values only hide a stuck consumer.
pub const MAX_QUEUE_CAPACITY: usize = 65_536;

/// Connection hub configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Messages buffered per connection before broadcasts to it are dropped
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,

    /// Connect/disconnect events buffered ahead of the event loop
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
}

impl HubConfig {
    /// Validate hub configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=MAX_QUEUE_CAPACITY).contains(&self.outbound_queue_capacity) {
            return Err(ValidationError::InvalidQueueCapacity("outbound_queue_capacity"));
        }
        if !(1..=MAX_QUEUE_CAPACITY).contains(&self.event_queue_capacity) {
            return Err(ValidationError::InvalidQueueCapacity("event_queue_capacity"));
        }
        Ok(())
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: default_outbound_queue_capacity(),
            event_queue_capacity: default_event_queue_capacity(),
        }
    }
}

fn default_outbound_queue_capacity() -> usize {
    64
}

fn default_event_queue_capacity() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_config_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.outbound_queue_capacity, 64);
        assert_eq!(config.event_queue_capacity, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_zero_capacity() {
        let config = HubConfig {
            outbound_queue_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidQueueCapacity("outbound_queue_capacity"))
        ));

        let config = HubConfig {
            event_queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_capacity_too_large() {
        let config = HubConfig {
            event_queue_capacity: MAX_QUEUE_CAPACITY + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
