//! Severity level definitions
//!
//! Severities are ordered by rank, with `Critical` ranked lowest (most
//! severe). A message is delivered through a sink floored at `floor`
//! iff `rank(msg) <= rank(floor)`, so raising the floor towards
//! `Extreme` lets more traffic through.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::fields::{FieldReporter, FieldValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Default)]
pub enum Severity {
    Critical = 0,
    #[default]
    Warning = 1,
    Information = 2,
    Debug = 3,
    ExtraDebug1 = 4,
    Extreme = 5,
}

impl Severity {
    pub fn to_str(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::Warning => "Warning",
            Severity::Information => "Information",
            Severity::Debug => "Debug",
            Severity::ExtraDebug1 => "ExtraDebug1",
            Severity::Extreme => "Extreme",
        }
    }

    /// Three-letter tag used by the line formatter.
    pub fn tag(&self) -> &'static str {
        match self {
            Severity::Critical => "CRI",
            Severity::Warning => "WRN",
            Severity::Information => "INF",
            Severity::Debug => "DBG",
            Severity::ExtraDebug1 => "XD1",
            Severity::Extreme => "XTR",
        }
    }

    /// Numeric rank, `Critical` being 0.
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// Whether a message at this severity passes a sink floored at `floor`.
    ///
    /// The comparison is inclusive: a `Warning` message passes a
    /// `Warning` floor.
    pub fn passes(&self, floor: Severity) -> bool {
        self.rank() <= floor.rank()
    }

    #[cfg(feature = "console")]
    pub fn color_code(&self) -> colored::Color {
        use colored::Color::*;
        match self {
            Severity::Critical => BrightRed,
            Severity::Warning => Yellow,
            Severity::Information => Green,
            Severity::Debug => Blue,
            Severity::ExtraDebug1 => BrightBlack,
            Severity::Extreme => BrightBlack,
        }
    }

    /// The three-letter tag, colorized for terminal console frontends.
    #[cfg(feature = "console")]
    pub fn colored_tag(&self) -> colored::ColoredString {
        use colored::Colorize;
        self.tag().color(self.color_code())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "warning" | "warn" => Ok(Severity::Warning),
            "information" | "info" => Ok(Severity::Information),
            "debug" => Ok(Severity::Debug),
            "extradebug1" => Ok(Severity::ExtraDebug1),
            "extreme" => Ok(Severity::Extreme),
            _ => Err(format!("Invalid severity: '{}'", s)),
        }
    }
}

impl FieldReporter for Severity {
    fn each_field(&self, f: &mut dyn FnMut(&str, FieldValue)) {
        f("severity", FieldValue::from(self.to_str()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order() {
        assert!(Severity::Critical < Severity::Warning);
        assert!(Severity::Warning < Severity::Information);
        assert!(Severity::Information < Severity::Debug);
        assert!(Severity::Debug < Severity::ExtraDebug1);
        assert!(Severity::ExtraDebug1 < Severity::Extreme);
    }

    #[test]
    fn test_passes_is_inclusive() {
        assert!(Severity::Warning.passes(Severity::Warning));
        assert!(Severity::Critical.passes(Severity::Warning));
        assert!(!Severity::Information.passes(Severity::Warning));
    }

    #[test]
    fn test_ordering_law_all_pairs() {
        let levels = [
            Severity::Critical,
            Severity::Warning,
            Severity::Information,
            Severity::Debug,
            Severity::ExtraDebug1,
        ];
        for msg in levels {
            for floor in levels {
                assert_eq!(
                    msg.passes(floor),
                    msg.rank() <= floor.rank(),
                    "msg={} floor={}",
                    msg,
                    floor
                );
            }
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!("Warning".parse::<Severity>().unwrap(), Severity::Warning);
        assert_eq!("information".parse::<Severity>().unwrap(), Severity::Information);
        assert_eq!("EXTRADEBUG1".parse::<Severity>().unwrap(), Severity::ExtraDebug1);
        assert!("verbose".parse::<Severity>().is_err());
    }

    #[test]
    fn test_tags() {
        assert_eq!(Severity::Critical.tag(), "CRI");
        assert_eq!(Severity::Warning.tag(), "WRN");
        assert_eq!(Severity::Information.tag(), "INF");
    }

    #[test]
    #[cfg(feature = "console")]
    fn test_colored_tag_keeps_text() {
        use colored::Colorize as _;
        let tag = Severity::Critical.colored_tag();
        assert!(tag.clear().to_string().contains("CRI"));
    }
}
