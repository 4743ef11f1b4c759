//! Null and well-known-type policy.
//!
//! Decides, for every resolved field, the type generated code should expose
//! and the wire metadata that keeps the binary encoding compatible with the
//! declared schema. The engine is a pure function of the field, the file's
//! compatibility level and two switches; it keeps no state between fields.
//!
//! | declared type                   | switch on                              | switch off              |
//! |---------------------------------|----------------------------------------|-------------------------|
//! | `google.protobuf.*Value`        | nullable scalar, null-wrapped          | the wrapper message     |
//! | `google.protobuf.Timestamp`     | nullable instant, compat level 300     | same type, `well_known` |
//! | `google.protobuf.Duration`      | nullable duration, compat level 300    | same type, `well_known` |
//!
//! Collections never collapse; a null element of a collection is the
//! business of the null-carrying wrapper the model builder synthesizes.

use crate::descriptor::ScalarKind;
use crate::model::{Cardinality, EnumId, FieldType, MessageId};
use serde::Serialize;
use std::fmt;
use tracing::trace;

/// Compatibility level from which temporal fields use the well-known encoding
/// without a per-field marker
pub const TEMPORAL_COMPAT_LEVEL: CompatibilityLevel = CompatibilityLevel(300);

/// Schema-wide encoding compatibility level, declared with
/// `option compatibility_level = N;`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CompatibilityLevel(pub u32);

impl CompatibilityLevel {
    /// Level assumed when a file declares none
    pub const DEFAULT: CompatibilityLevel = TEMPORAL_COMPAT_LEVEL;
}

impl Default for CompatibilityLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for CompatibilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scalar exposed in place of one of the nine wrapper messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NullableScalar {
    /// `google.protobuf.DoubleValue`
    Double,
    /// `google.protobuf.FloatValue`
    Float,
    /// `google.protobuf.Int64Value`
    Int64,
    /// `google.protobuf.UInt64Value`
    Uint64,
    /// `google.protobuf.Int32Value`
    Int32,
    /// `google.protobuf.UInt32Value`
    Uint32,
    /// `google.protobuf.BoolValue`
    Bool,
    /// `google.protobuf.StringValue`
    String,
    /// `google.protobuf.BytesValue`
    Bytes,
}

impl NullableScalar {
    /// Scalar kind of the wrapper's `value` field
    pub fn scalar(&self) -> ScalarKind {
        match self {
            NullableScalar::Double => ScalarKind::Double,
            NullableScalar::Float => ScalarKind::Float,
            NullableScalar::Int64 => ScalarKind::Int64,
            NullableScalar::Uint64 => ScalarKind::Uint64,
            NullableScalar::Int32 => ScalarKind::Int32,
            NullableScalar::Uint32 => ScalarKind::Uint32,
            NullableScalar::Bool => ScalarKind::Bool,
            NullableScalar::String => ScalarKind::String,
            NullableScalar::Bytes => ScalarKind::Bytes,
        }
    }
}

/// Native temporal type exposed in place of Timestamp or Duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NullableTemporal {
    /// Point in time (`google.protobuf.Timestamp`)
    Instant,
    /// Signed span of time (`google.protobuf.Duration`)
    Duration,
}

impl NullableTemporal {
    fn as_str(&self) -> &'static str {
        match self {
            NullableTemporal::Instant => "instant",
            NullableTemporal::Duration => "duration",
        }
    }
}

/// A recognized well-known message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WellKnown {
    /// One of the nine scalar wrappers
    Wrapper(NullableScalar),
    /// `Timestamp` or `Duration`
    Temporal(NullableTemporal),
}

/// Fully qualified names of the recognized well-known messages
const WELL_KNOWN: [(&str, WellKnown); 11] = [
    ("google.protobuf.DoubleValue", WellKnown::Wrapper(NullableScalar::Double)),
    ("google.protobuf.FloatValue", WellKnown::Wrapper(NullableScalar::Float)),
    ("google.protobuf.Int64Value", WellKnown::Wrapper(NullableScalar::Int64)),
    ("google.protobuf.UInt64Value", WellKnown::Wrapper(NullableScalar::Uint64)),
    ("google.protobuf.Int32Value", WellKnown::Wrapper(NullableScalar::Int32)),
    ("google.protobuf.UInt32Value", WellKnown::Wrapper(NullableScalar::Uint32)),
    ("google.protobuf.BoolValue", WellKnown::Wrapper(NullableScalar::Bool)),
    ("google.protobuf.StringValue", WellKnown::Wrapper(NullableScalar::String)),
    ("google.protobuf.BytesValue", WellKnown::Wrapper(NullableScalar::Bytes)),
    ("google.protobuf.Timestamp", WellKnown::Temporal(NullableTemporal::Instant)),
    ("google.protobuf.Duration", WellKnown::Temporal(NullableTemporal::Duration)),
];

impl WellKnown {
    /// Looks up a message by fully qualified name, without a leading dot
    pub fn lookup(full_name: &str) -> Option<WellKnown> {
        WELL_KNOWN
            .iter()
            .find(|(name, _)| *name == full_name)
            .map(|(_, known)| *known)
    }
}

/// The type generated code exposes for a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EffectiveType {
    /// Plain scalar
    Scalar(ScalarKind),
    /// Message, wrappers included when they are not collapsed
    Message(MessageId),
    /// Enum
    Enum(EnumId),
    /// Scalar that may be null
    NullableScalar(NullableScalar),
    /// Instant or duration that may be null
    NullableTemporal(NullableTemporal),
    /// Only present in models that carry errors
    Unresolved,
}

impl EffectiveType {
    /// Returns true if the exposed type can hold an explicit null
    pub fn is_nullable(&self) -> bool {
        matches!(
            self,
            EffectiveType::NullableScalar(_) | EffectiveType::NullableTemporal(_)
        )
    }

    /// Short human-readable name, used in snapshots
    pub fn describe(&self) -> String {
        match self {
            EffectiveType::Scalar(kind) => kind.as_str().to_string(),
            EffectiveType::Message(id) => format!("message#{}", id.index()),
            EffectiveType::Enum(id) => format!("enum#{}", id.index()),
            EffectiveType::NullableScalar(s) => format!("nullable {}", s.scalar().as_str()),
            EffectiveType::NullableTemporal(t) => format!("nullable {}", t.as_str()),
            EffectiveType::Unresolved => "unresolved".to_string(),
        }
    }
}

/// How a field's value is framed on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    /// Encoding implied by the declared type
    #[default]
    Default,
    /// Well-known message encoding (`seconds = 1`, `nanos = 2`)
    WellKnown,
    /// Start-group/end-group framing
    Group,
}

impl DataFormat {
    /// Marker text used by renderers
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Default => "default",
            DataFormat::WellKnown => "well_known",
            DataFormat::Group => "group",
        }
    }
}

/// Encoding decisions attached to a field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum WireMetadata {
    /// Plain encoding of the declared type
    #[default]
    Default,
    /// Nullable scalar carried inside its single-field wrapper message
    NullWrapped(NullableScalar),
    /// Native temporal whose well-known encoding is implied by the level
    CompatLevel(NullableTemporal, CompatibilityLevel),
    /// Native temporal with an explicit well-known data format on the field
    WellKnownFormat(NullableTemporal),
    /// Start-group/end-group framing
    Group,
}

impl WireMetadata {
    /// Data-format marker the field carries
    pub fn data_format(&self) -> DataFormat {
        match self {
            WireMetadata::WellKnownFormat(_) => DataFormat::WellKnown,
            WireMetadata::Group => DataFormat::Group,
            _ => DataFormat::Default,
        }
    }

    /// Returns true if the field carries the null-wrap marker
    pub fn is_null_wrapped(&self) -> bool {
        matches!(self, WireMetadata::NullWrapped(_))
    }

    /// Compatibility level the field's declaration must be generated with
    pub fn required_compat_level(&self) -> Option<CompatibilityLevel> {
        match self {
            WireMetadata::CompatLevel(_, level) => Some(*level),
            _ => None,
        }
    }
}

/// Global switches of the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyOptions {
    /// Collapse wrapper messages into nullable scalars
    pub null_wrappers: bool,
    /// Mark temporal fields with the compatibility level instead of a
    /// per-field data format
    pub compat_level: bool,
}

impl Default for PolicyOptions {
    fn default() -> Self {
        Self {
            null_wrappers: true,
            compat_level: true,
        }
    }
}

/// Everything the policy looks at for one field
#[derive(Debug, Clone, Copy)]
pub struct FieldContext<'a> {
    /// Presence and multiplicity
    pub cardinality: Cardinality,
    /// Declared type
    pub ty: &'a FieldType,
    /// Fully qualified name of the referenced message, if any
    pub target: Option<&'a str>,
    /// Level declared (or defaulted) by the field's file
    pub file_level: CompatibilityLevel,
    /// Field is a proto2 group or a null-carrying collection
    pub group_framed: bool,
}

/// Outcome of the policy for one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Type generated code exposes
    pub effective: EffectiveType,
    /// How the field travels on the wire
    pub wire: WireMetadata,
}

/// Applies the null and well-known-type policy to one field
pub fn decide(ctx: &FieldContext<'_>, options: PolicyOptions) -> Decision {
    let plain = |effective| Decision {
        effective,
        wire: WireMetadata::Default,
    };

    let message = match ctx.ty {
        FieldType::Scalar(kind) => return plain(EffectiveType::Scalar(*kind)),
        FieldType::Enum(id) => return plain(EffectiveType::Enum(*id)),
        FieldType::Unresolved(_) => return plain(EffectiveType::Unresolved),
        FieldType::Message(id) => *id,
    };

    if ctx.group_framed {
        return Decision {
            effective: EffectiveType::Message(message),
            wire: WireMetadata::Group,
        };
    }
    if ctx.cardinality == Cardinality::Repeated {
        return plain(EffectiveType::Message(message));
    }

    let decision = match ctx.target.and_then(WellKnown::lookup) {
        Some(WellKnown::Wrapper(scalar)) if options.null_wrappers => Decision {
            effective: EffectiveType::NullableScalar(scalar),
            wire: WireMetadata::NullWrapped(scalar),
        },
        Some(WellKnown::Temporal(temporal)) => {
            let wire = if options.compat_level && ctx.file_level >= TEMPORAL_COMPAT_LEVEL {
                WireMetadata::CompatLevel(temporal, TEMPORAL_COMPAT_LEVEL)
            } else {
                WireMetadata::WellKnownFormat(temporal)
            };
            Decision {
                effective: EffectiveType::NullableTemporal(temporal),
                wire,
            }
        }
        _ => plain(EffectiveType::Message(message)),
    };
    if decision.wire != WireMetadata::Default {
        trace!(
            "Policy maps {} to {}",
            ctx.target.unwrap_or_default(),
            decision.effective.describe()
        );
    }
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx<'a>(ty: &'a FieldType, target: Option<&'a str>) -> FieldContext<'a> {
        FieldContext {
            cardinality: Cardinality::Singular,
            ty,
            target,
            file_level: CompatibilityLevel::DEFAULT,
            group_framed: false,
        }
    }

    const MSG: FieldType = FieldType::Message(MessageId(0));

    #[test]
    fn test_every_wrapper_collapses() {
        for (name, known) in WELL_KNOWN {
            let WellKnown::Wrapper(scalar) = known else {
                continue;
            };
            let d = decide(&ctx(&MSG, Some(name)), PolicyOptions::default());
            assert_eq!(d.effective, EffectiveType::NullableScalar(scalar));
            assert!(d.wire.is_null_wrapped());
            assert_eq!(d.wire.data_format(), DataFormat::Default);
        }
    }

    #[test]
    fn test_wrappers_disabled() {
        let options = PolicyOptions {
            null_wrappers: false,
            ..PolicyOptions::default()
        };
        let d = decide(&ctx(&MSG, Some("google.protobuf.Int32Value")), options);
        assert_eq!(d.effective, EffectiveType::Message(MessageId(0)));
        assert_eq!(d.wire, WireMetadata::Default);
    }

    #[test]
    fn test_temporal_with_compat_level() {
        let d = decide(
            &ctx(&MSG, Some("google.protobuf.Timestamp")),
            PolicyOptions::default(),
        );
        assert_eq!(d.effective, EffectiveType::NullableTemporal(NullableTemporal::Instant));
        assert_eq!(d.wire.required_compat_level(), Some(CompatibilityLevel(300)));
        assert_eq!(d.wire.data_format(), DataFormat::Default);
    }

    #[test]
    fn test_temporal_without_compat_level() {
        let options = PolicyOptions {
            compat_level: false,
            ..PolicyOptions::default()
        };
        let d = decide(&ctx(&MSG, Some("google.protobuf.Duration")), options);
        assert_eq!(d.effective, EffectiveType::NullableTemporal(NullableTemporal::Duration));
        assert_eq!(d.wire.required_compat_level(), None);
        assert_eq!(d.wire.data_format(), DataFormat::WellKnown);
    }

    #[test]
    fn test_low_file_level_falls_back_to_data_format() {
        let mut c = ctx(&MSG, Some("google.protobuf.Timestamp"));
        c.file_level = CompatibilityLevel(200);
        let d = decide(&c, PolicyOptions::default());
        assert_eq!(d.wire, WireMetadata::WellKnownFormat(NullableTemporal::Instant));
    }

    #[test]
    fn test_collections_never_collapse() {
        let mut c = ctx(&MSG, Some("google.protobuf.Int32Value"));
        c.cardinality = Cardinality::Repeated;
        let d = decide(&c, PolicyOptions::default());
        assert_eq!(d.wire, WireMetadata::Default);
    }

    #[test]
    fn test_group_framing_wins() {
        let mut c = ctx(&MSG, Some("pkg.NullWrappedBar"));
        c.cardinality = Cardinality::Repeated;
        c.group_framed = true;
        let d = decide(&c, PolicyOptions::default());
        assert_eq!(d.wire.data_format(), DataFormat::Group);
    }

    #[test]
    fn test_plain_types_pass_through() {
        let scalar = FieldType::Scalar(ScalarKind::Int32);
        let d = decide(&ctx(&scalar, None), PolicyOptions::default());
        assert_eq!(d.effective, EffectiveType::Scalar(ScalarKind::Int32));
        assert_eq!(d.wire, WireMetadata::Default);

        let other = decide(&ctx(&MSG, Some("pkg.Other")), PolicyOptions::default());
        assert_eq!(other.effective, EffectiveType::Message(MessageId(0)));
    }
}
