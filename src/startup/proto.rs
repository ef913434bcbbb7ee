//! Remote-write protobuf message negotiation.

use std::collections::BTreeSet;
use std::fmt;

use super::flags::{self, FlagSet};
use super::mode::Mode;

/// Remote-write message encodings the receiver understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtoMessageType {
    /// `prometheus.WriteRequest`
    WriteV1,
    /// `io.prometheus.write.v2.Request`
    WriteV2,
}

impl ProtoMessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProtoMessageType::WriteV1 => "prometheus.WriteRequest",
            ProtoMessageType::WriteV2 => "io.prometheus.write.v2.Request",
        }
    }
}

impl fmt::Display for ProtoMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed set of recognized message types.
#[derive(Debug, Clone, Copy)]
pub struct ProtoMessageRegistry {
    entries: &'static [ProtoMessageType],
}

impl ProtoMessageRegistry {
    pub const fn new(entries: &'static [ProtoMessageType]) -> Self {
        Self { entries }
    }

    /// Membership test by wire identifier.
    pub fn lookup(&self, identifier: &str) -> Option<ProtoMessageType> {
        self.entries
            .iter()
            .copied()
            .find(|entry| entry.as_str() == identifier)
    }

    pub fn identifiers(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.as_str()).collect()
    }

    /// Resolve requested identifiers, failing on the first unknown one.
    ///
    /// An empty request selects every registered type.
    pub fn validate(
        &self,
        requested: &[&str],
    ) -> Result<BTreeSet<ProtoMessageType>, UnknownMessage> {
        if requested.is_empty() {
            return Ok(self.entries.iter().copied().collect());
        }

        requested
            .iter()
            .map(|identifier| {
                self.lookup(identifier).ok_or_else(|| UnknownMessage {
                    identifier: identifier.to_string(),
                    supported: self.identifiers(),
                })
            })
            .collect()
    }

    /// Resolve the message types named by
    /// `--web.remote-write-receiver.accepted-protobuf-messages`.
    pub fn validate_flags(
        &self,
        mode: Mode,
        flags: &FlagSet,
    ) -> Result<BTreeSet<ProtoMessageType>, ProtoViolation> {
        let requested = flags
            .get(flags::ACCEPTED_PROTOBUF_MESSAGES)
            .map(split_message_list)
            .unwrap_or_default();
        self.validate(&requested).map_err(|unknown| ProtoViolation {
            mode,
            flag: flags::ACCEPTED_PROTOBUF_MESSAGES,
            unknown,
        })
    }
}

impl Default for ProtoMessageRegistry {
    fn default() -> Self {
        REGISTRY
    }
}

pub const REGISTRY: ProtoMessageRegistry =
    ProtoMessageRegistry::new(&[ProtoMessageType::WriteV1, ProtoMessageType::WriteV2]);

/// Split a flag value into identifiers.
///
/// Repeated flags arrive joined by commas; blank segments are dropped.
pub fn split_message_list(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMessage {
    /// First identifier that is not in the registry.
    pub identifier: String,
    pub supported: Vec<&'static str>,
}

impl fmt::Display for UnknownMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown remote-write protobuf message {:?}, supported: {}",
            self.identifier,
            self.supported.join(", ")
        )
    }
}

impl std::error::Error for UnknownMessage {}

/// An unknown message type passed on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoViolation {
    pub mode: Mode,
    pub flag: &'static str,
    pub unknown: UnknownMessage,
}

impl fmt::Display for ProtoViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "flag --{} names unknown remote-write protobuf message {:?} in {} mode, supported: {}",
            self.flag,
            self.unknown.identifier,
            self.mode,
            self.unknown.supported.join(", ")
        )
    }
}

impl std::error::Error for ProtoViolation {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_messages_accepted() {
        let requested = split_message_list("prometheus.WriteRequest,io.prometheus.write.v2.Request");
        let resolved = REGISTRY.validate(&requested).unwrap();
        assert_eq!(
            resolved.into_iter().collect::<Vec<_>>(),
            vec![ProtoMessageType::WriteV1, ProtoMessageType::WriteV2]
        );
    }

    #[test]
    fn test_each_known_message_alone() {
        for id in REGISTRY.identifiers() {
            let resolved = REGISTRY.validate(&[id]).unwrap();
            assert_eq!(resolved.len(), 1);
        }
    }

    #[test]
    fn test_first_unknown_is_named() {
        let requested = split_message_list("unknown1,unknown2");
        let err = REGISTRY.validate(&requested).unwrap_err();
        assert_eq!(err.identifier, "unknown1");
        assert!(err.to_string().contains("\"unknown1\""));
        assert!(err.to_string().contains("prometheus.WriteRequest"));
    }

    #[test]
    fn test_unknown_after_known() {
        let err = REGISTRY
            .validate(&["prometheus.WriteRequest", "prometheus.WriteRequestV3"])
            .unwrap_err();
        assert_eq!(err.identifier, "prometheus.WriteRequestV3");
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert_eq!(REGISTRY.lookup("Prometheus.WriteRequest"), None);
    }

    #[test]
    fn test_duplicates_collapse() {
        let requested = split_message_list("prometheus.WriteRequest, prometheus.WriteRequest");
        let resolved = REGISTRY.validate(&requested).unwrap();
        assert_eq!(resolved.len(), 1);
    }

    #[test]
    fn test_empty_request_selects_defaults() {
        let resolved = REGISTRY.validate(&split_message_list(" , ")).unwrap();
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn test_flag_violation_names_flag_and_mode() {
        let flags = FlagSet::from_iter([(flags::ACCEPTED_PROTOBUF_MESSAGES, "unknown1,unknown2")]);
        let err = REGISTRY.validate_flags(Mode::Server, &flags).unwrap_err();
        assert_eq!(err.flag, flags::ACCEPTED_PROTOBUF_MESSAGES);
        assert_eq!(err.unknown.identifier, "unknown1");
        assert_eq!(
            err.to_string(),
            "flag --web.remote-write-receiver.accepted-protobuf-messages names unknown \
             remote-write protobuf message \"unknown1\" in server mode, supported: \
             prometheus.WriteRequest, io.prometheus.write.v2.Request"
        );
    }

    #[test]
    fn test_absent_flag_selects_every_type() {
        let resolved = REGISTRY
            .validate_flags(Mode::Server, &FlagSet::default())
            .unwrap();
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn test_restricted_registry() {
        let registry = ProtoMessageRegistry::new(&[ProtoMessageType::WriteV1]);
        assert!(registry.validate(&["prometheus.WriteRequest"]).is_ok());
        let err = registry
            .validate(&["io.prometheus.write.v2.Request"])
            .unwrap_err();
        assert_eq!(err.supported, vec!["prometheus.WriteRequest"]);
    }
}
