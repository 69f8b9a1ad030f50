//! Channel naming and the NATS subjects behind each channel.

/// Prefix shared by every per-request reply channel.
pub const REPLY_CHANNEL_PREFIX: &str = "response-";

/// Reply channel for a correlation id. Deterministic so the worker can be
/// told where to answer and the caller knows what to delete.
pub fn reply_channel_name(correlation_id: &str) -> String {
    format!("{REPLY_CHANNEL_PREFIX}{correlation_id}")
}

pub fn is_reply_channel(name: &str) -> bool {
    name.len() > REPLY_CHANNEL_PREFIX.len() && name.starts_with(REPLY_CHANNEL_PREFIX)
}

/// A channel name must be a single NATS subject token.
pub fn is_valid_channel_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c == '.' || c == '*' || c == '>' || c.is_whitespace())
}

/// Subject layout under a deployment prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subjects {
    prefix: String,
}

impl Subjects {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `{prefix}.work.{queue}`
    pub fn work(&self, queue: &str) -> String {
        format!("{}.work.{}", self.prefix, queue)
    }

    /// `{prefix}.reply.{channel}`
    pub fn reply(&self, channel: &str) -> String {
        format!("{}.reply.{}", self.prefix, channel)
    }

    /// JetStream stream backing a work queue, e.g. `COURIER_WORK_COPILOT_API`.
    pub fn work_stream(&self, queue: &str) -> String {
        format!(
            "{}_WORK_{}",
            stream_token(&self.prefix),
            stream_token(queue)
        )
    }
}

fn stream_token(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_channel_is_derived_from_correlation_id() {
        assert_eq!(reply_channel_name("abc"), "response-abc");
        assert!(is_reply_channel(&reply_channel_name("abc")));
    }

    #[test]
    fn work_queues_are_not_reply_channels() {
        assert!(!is_reply_channel("copilot-api"));
        assert!(!is_reply_channel("response-"));
        assert!(!is_reply_channel("responses"));
    }

    #[test]
    fn channel_names_must_be_single_tokens() {
        assert!(is_valid_channel_name("copilot-api"));
        assert!(is_valid_channel_name("response-2b1c"));
        assert!(!is_valid_channel_name(""));
        assert!(!is_valid_channel_name("a.b"));
        assert!(!is_valid_channel_name("work*"));
        assert!(!is_valid_channel_name(">"));
        assert!(!is_valid_channel_name("has space"));
    }

    #[test]
    fn subjects_are_scoped_by_prefix() {
        let subjects = Subjects::new("courier");

        assert_eq!(subjects.work("copilot-api"), "courier.work.copilot-api");
        assert_eq!(subjects.reply("response-1"), "courier.reply.response-1");
        assert_eq!(subjects.prefix(), "courier");
    }

    #[test]
    fn stream_names_are_upper_snake_case() {
        let subjects = Subjects::new("courier");

        assert_eq!(subjects.work_stream("copilot-api"), "COURIER_WORK_COPILOT_API");
        assert_eq!(
            Subjects::new("acme-prod").work_stream("jobs"),
            "ACME_PROD_WORK_JOBS"
        );
    }
}
