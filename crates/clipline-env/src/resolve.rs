//! Resolves a stage's `EnvironmentRequirement` (from the Stage Registry) into
//! a concrete environment name, applying the routing policy for the two
//! requirements that aren't fixed.

use clipline_core::{EnvironmentRequirement, HardwareCapabilityReport};

use crate::error::{Error, Result};
use crate::routing::{route_asr_environment, route_translation_environment};

/// The language pair a `TranslationRouted` stage needs routed. ASR routing
/// only needs the hardware report; translation routing only needs languages,
/// so each requirement only asks for what it actually uses.
pub struct LanguagePair<'a> {
    pub source: &'a str,
    pub target: &'a str,
}

pub fn resolve_environment(
    requirement: EnvironmentRequirement,
    hardware: &HardwareCapabilityReport,
    language_pair: Option<LanguagePair<'_>>,
) -> Result<&'static str> {
    match requirement {
        EnvironmentRequirement::Fixed(name) => Ok(name),
        EnvironmentRequirement::AsrRouted => Ok(route_asr_environment(hardware)),
        EnvironmentRequirement::TranslationRouted => {
            let pair = language_pair.ok_or_else(|| {
                Error::UnknownEnvironment(
                    "translation routing requires a language pair".to_string(),
                )
            })?;
            Ok(route_translation_environment(pair.source, pair.target))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_requirement_passes_through() {
        let hardware = HardwareCapabilityReport::default();
        let env = resolve_environment(EnvironmentRequirement::Fixed("common"), &hardware, None).unwrap();
        assert_eq!(env, "common");
    }

    #[test]
    fn translation_routed_requires_a_language_pair() {
        let hardware = HardwareCapabilityReport::default();
        let err = resolve_environment(EnvironmentRequirement::TranslationRouted, &hardware, None);
        assert!(err.is_err());

        let env = resolve_environment(
            EnvironmentRequirement::TranslationRouted,
            &hardware,
            Some(LanguagePair { source: "hi", target: "en" }),
        )
        .unwrap();
        assert_eq!(env, "indictrans2");
    }
}
