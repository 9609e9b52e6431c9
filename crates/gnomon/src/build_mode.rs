//! Compile-time build mode selection.
//!
//! The mode is chosen through cargo features (`mode-development`,
//! `mode-test`, `mode-profile`, `mode-qa`, `mode-production`). With none of
//! them enabled the mode is [`BuildMode::Off`]: every instrumentation entry
//! point returns immediately and the optimizer removes the calls.

/// Operating mode for the library, fixed at compile time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuildMode {
    Off,
    Development,
    Test,
    Profile,
    Qa,
    Production,
}

/// Coarse classification of records, used by the emission policy and by
/// sink filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordCategory {
    /// Contract violation reports.
    Contract,
    /// Final profile aggregates.
    Profile,
    /// Ad-hoc messages and library diagnostics.
    Message,
}

impl RecordCategory {
    pub const fn name(self) -> &'static str {
        match self {
            RecordCategory::Contract => "contract",
            RecordCategory::Profile => "profile",
            RecordCategory::Message => "message",
        }
    }
}

impl BuildMode {
    /// Mode selected for this build. When feature unification turns on
    /// several mode features at once, the strictest wins.
    pub const CURRENT: BuildMode = if cfg!(feature = "mode-production") {
        BuildMode::Production
    } else if cfg!(feature = "mode-qa") {
        BuildMode::Qa
    } else if cfg!(feature = "mode-profile") {
        BuildMode::Profile
    } else if cfg!(feature = "mode-test") {
        BuildMode::Test
    } else if cfg!(feature = "mode-development") {
        BuildMode::Development
    } else {
        BuildMode::Off
    };

    /// False when instrumentation is compiled out.
    #[inline]
    pub const fn enabled() -> bool {
        !matches!(Self::CURRENT, BuildMode::Off)
    }

    /// Short name, as carried in the `build_mode` record key.
    pub const fn name(self) -> &'static str {
        match self {
            BuildMode::Off => "off",
            BuildMode::Development => "dev",
            BuildMode::Test => "test",
            BuildMode::Profile => "prof",
            BuildMode::Qa => "qa",
            BuildMode::Production => "prod",
        }
    }

    /// Whether records of `category` are emitted in this mode.
    ///
    /// Contract reports are never suppressed in an enabled mode. Profile
    /// aggregates are limited to the measurement-oriented modes; the profile
    /// mode in turn drops ad-hoc messages to keep its output lean.
    pub const fn emits(self, category: RecordCategory) -> bool {
        match (self, category) {
            (BuildMode::Off, _) => false,
            (_, RecordCategory::Contract) => true,
            (BuildMode::Development | BuildMode::Test | BuildMode::Profile, RecordCategory::Profile) => true,
            (_, RecordCategory::Profile) => false,
            (BuildMode::Profile, RecordCategory::Message) => false,
            (_, RecordCategory::Message) => true,
        }
    }

    /// Whether a contract violation propagates as a panic. In production the
    /// violation is recorded and execution continues.
    pub const fn contracts_propagate(self) -> bool {
        !matches!(self, BuildMode::Off | BuildMode::Production)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_build_is_development() {
        // The workspace default feature set; tests rely on it.
        assert_eq!(BuildMode::CURRENT, BuildMode::Development);
        assert!(BuildMode::enabled());
    }

    #[test]
    fn emission_policy() {
        for mode in [
            BuildMode::Development,
            BuildMode::Test,
            BuildMode::Profile,
            BuildMode::Qa,
            BuildMode::Production,
        ] {
            assert!(mode.emits(RecordCategory::Contract));
        }
        assert!(BuildMode::Profile.emits(RecordCategory::Profile));
        assert!(!BuildMode::Qa.emits(RecordCategory::Profile));
        assert!(!BuildMode::Production.emits(RecordCategory::Profile));
        assert!(!BuildMode::Profile.emits(RecordCategory::Message));
        assert!(BuildMode::Production.emits(RecordCategory::Message));
        for category in [
            RecordCategory::Contract,
            RecordCategory::Profile,
            RecordCategory::Message,
        ] {
            assert!(!BuildMode::Off.emits(category));
        }
    }

    #[test]
    fn propagation_policy() {
        assert!(BuildMode::Development.contracts_propagate());
        assert!(BuildMode::Test.contracts_propagate());
        assert!(!BuildMode::Production.contracts_propagate());
        assert!(!BuildMode::Off.contracts_propagate());
    }
}
