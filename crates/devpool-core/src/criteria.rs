//! Match criteria for selecting devices.
//!
//! Criteria are conjunctive: a device matches when every supplied criterion
//! holds, and an empty criteria set matches every device. Pattern criteria are
//! regular expressions anchored at the start of the field but free to stop
//! before its end, so `type = "phone"` matches `"phone-1"`.

use crate::device::DeviceInfo;
use crate::error::{BrokerError, BrokerResult};
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// Device info field a pattern is tested against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchField {
    /// `DeviceInfo::id`
    Id,
    /// `DeviceInfo::device_type`
    Type,
    /// `DeviceInfo::sw`
    Sw,
    /// `DeviceInfo::hw`
    Hw,
    /// `DeviceInfo::display`
    Display,
}

impl MatchField {
    /// Key used for this field in textual criteria.
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchField::Id => "id",
            MatchField::Type => "type",
            MatchField::Sw => "sw",
            MatchField::Hw => "hw",
            MatchField::Display => "display",
        }
    }

    fn value<'a>(&self, info: &'a DeviceInfo) -> &'a str {
        match self {
            MatchField::Id => &info.id,
            MatchField::Type => &info.device_type,
            MatchField::Sw => &info.sw,
            MatchField::Hw => &info.hw,
            MatchField::Display => &info.display,
        }
    }
}

impl fmt::Display for MatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchField {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(MatchField::Id),
            "type" => Ok(MatchField::Type),
            "sw" => Ok(MatchField::Sw),
            "hw" => Ok(MatchField::Hw),
            "display" => Ok(MatchField::Display),
            other => Err(BrokerError::InvalidCriterion(format!(
                "unknown field '{}'",
                other
            ))),
        }
    }
}

/// Conjunctive device filter.
#[derive(Debug, Clone, Default)]
pub struct MatchCriteria {
    patterns: Vec<(MatchField, Regex)>,
    free: Option<bool>,
    busy: Option<bool>,
}

impl MatchCriteria {
    /// Criteria matching every device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a start-anchored regular expression on `field`.
    pub fn with_pattern(mut self, field: MatchField, pattern: &str) -> BrokerResult<Self> {
        let invalid = |source| BrokerError::InvalidPattern {
            field: field.as_str(),
            source,
        };
        // Validate on its own first; unbalanced groups would escape the anchor.
        Regex::new(pattern).map_err(invalid)?;
        let regex = Regex::new(&format!("^(?:{})", pattern)).map_err(invalid)?;
        self.patterns.push((field, regex));
        Ok(self)
    }

    /// Require the device to be available (`true`) or at capacity (`false`).
    pub fn with_free(mut self, free: bool) -> Self {
        self.free = Some(free);
        self
    }

    /// Require the device to be at capacity (`true`) or available (`false`).
    pub fn with_busy(mut self, busy: bool) -> Self {
        self.busy = Some(busy);
        self
    }

    /// Build criteria from `key = value` pairs.
    ///
    /// Keys are `id`, `type`, `sw`, `hw`, `display` (patterns) and `free`,
    /// `busy` (case-insensitive `true`/`false`).
    pub fn from_pairs<I, K, V>(pairs: I) -> BrokerResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut criteria = Self::new();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            criteria = match key {
                "free" => criteria.with_free(parse_flag(key, value)?),
                "busy" => criteria.with_busy(parse_flag(key, value)?),
                field => criteria.with_pattern(field.parse()?, value)?,
            };
        }
        Ok(criteria)
    }

    /// True when no criterion is set.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.free.is_none() && self.busy.is_none()
    }

    /// Whether the info satisfies every pattern criterion.
    pub fn matches_info(&self, info: &DeviceInfo) -> bool {
        self.patterns
            .iter()
            .all(|(field, regex)| regex.is_match(field.value(info)))
    }

    /// Whether a device with the given availability satisfies `free`/`busy`.
    pub fn matches_availability(&self, available: bool) -> bool {
        self.free.map_or(true, |free| free == available)
            && self.busy.map_or(true, |busy| busy == !available)
    }
}

fn parse_flag(key: &str, value: &str) -> BrokerResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(BrokerError::InvalidCriterion(format!(
            "'{}' expects true or false, got '{}'",
            key, value
        ))),
    }
}
