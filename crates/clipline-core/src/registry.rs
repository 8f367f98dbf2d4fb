//! The Stage Registry (C3): the single, fixed, ordered source of truth for
//! stage names, numbers, directories, and environments.
//!
//! A table of descriptors plus lookup functions stands in for dynamic
//! dispatch by name; the orchestrator calls a single launcher over a
//! descriptor rather than polymorphic stage objects (§9).

use crate::job::Workflow;
use crate::{Error, Result};

/// The dependency environment a stage needs, or the routing rule that picks
/// one at run time. `AsrRouted` / `TranslationRouted` are resolved by
/// `clipline-env`'s policy against a `HardwareCapabilityReport` and the
/// job's language pair (§4.3) — the registry only records that routing is
/// required, not the decision itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentRequirement {
    Fixed(&'static str),
    AsrRouted,
    TranslationRouted,
}

/// Whether a stage's failure aborts the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fatality {
    /// Always fatal, or always optional, regardless of workflow.
    Fixed(bool),
    /// Fatal only for the workflows listed; optional (or non-participating) otherwise.
    FatalFor(&'static [Workflow]),
}

/// A single entry in the Stage Registry.
#[derive(Debug, Clone, Copy)]
pub struct StageDescriptor {
    pub number: u32,
    pub name: &'static str,
    pub environment: EnvironmentRequirement,
    pub fatality: Fatality,
    pub participates_in: &'static [Workflow],
}

impl StageDescriptor {
    /// Canonical on-disk directory name, e.g. `"06_asr"`.
    pub fn directory_name(&self) -> String {
        format!("{:02}_{}", self.number, self.name)
    }

    pub fn is_fatal_for(&self, workflow: Workflow) -> bool {
        match self.fatality {
            Fatality::Fixed(f) => f,
            Fatality::FatalFor(workflows) => workflows.contains(&workflow),
        }
    }

    pub fn participates_in_workflow(&self, workflow: Workflow) -> bool {
        self.participates_in.contains(&workflow)
    }
}

use Workflow::{Subtitle, Translate};

/// The canonical, fixed stage list. Names, numbers, and order MUST NOT change
/// independently of this table (§4.3 invariant).
pub const STAGES: &[StageDescriptor] = &[
    StageDescriptor {
        number: 1,
        name: "demux",
        environment: EnvironmentRequirement::Fixed("common"),
        fatality: Fatality::Fixed(true),
        participates_in: &[Workflow::Transcribe, Translate, Subtitle],
    },
    StageDescriptor {
        number: 2,
        name: "tmdb",
        environment: EnvironmentRequirement::Fixed("common"),
        fatality: Fatality::Fixed(false),
        participates_in: &[Workflow::Transcribe, Translate, Subtitle],
    },
    StageDescriptor {
        number: 3,
        name: "glossary_load",
        environment: EnvironmentRequirement::Fixed("common"),
        fatality: Fatality::Fixed(false),
        participates_in: &[Workflow::Transcribe, Translate, Subtitle],
    },
    StageDescriptor {
        number: 4,
        name: "source_separation",
        environment: EnvironmentRequirement::Fixed("demucs"),
        fatality: Fatality::Fixed(false),
        participates_in: &[Workflow::Transcribe, Translate, Subtitle],
    },
    StageDescriptor {
        number: 5,
        name: "pyannote_vad",
        environment: EnvironmentRequirement::Fixed("pyannote"),
        fatality: Fatality::Fixed(false),
        participates_in: &[Workflow::Transcribe, Translate, Subtitle],
    },
    StageDescriptor {
        number: 6,
        name: "asr",
        environment: EnvironmentRequirement::AsrRouted,
        fatality: Fatality::Fixed(true),
        participates_in: &[Workflow::Transcribe, Translate, Subtitle],
    },
    StageDescriptor {
        number: 7,
        name: "alignment",
        environment: EnvironmentRequirement::Fixed("whisperx"),
        fatality: Fatality::Fixed(false),
        participates_in: &[Workflow::Transcribe, Translate, Subtitle],
    },
    StageDescriptor {
        number: 8,
        name: "lyrics_detection",
        environment: EnvironmentRequirement::Fixed("demucs"),
        fatality: Fatality::Fixed(false),
        participates_in: &[Workflow::Transcribe, Translate, Subtitle],
    },
    StageDescriptor {
        number: 9,
        name: "translation",
        environment: EnvironmentRequirement::TranslationRouted,
        fatality: Fatality::FatalFor(&[Translate, Subtitle]),
        participates_in: &[Translate, Subtitle],
    },
    StageDescriptor {
        number: 10,
        name: "subtitle_generation",
        environment: EnvironmentRequirement::Fixed("common"),
        fatality: Fatality::FatalFor(&[Subtitle]),
        participates_in: &[Subtitle],
    },
    StageDescriptor {
        number: 11,
        name: "mux",
        environment: EnvironmentRequirement::Fixed("common"),
        fatality: Fatality::FatalFor(&[Subtitle]),
        participates_in: &[Subtitle],
    },
];

/// Look up a stage descriptor by name.
pub fn stage(name: &str) -> Result<&'static StageDescriptor> {
    STAGES
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| Error::UnknownStage(name.to_string()))
}

pub fn stage_number(name: &str) -> Result<u32> {
    stage(name).map(|s| s.number)
}

pub fn stage_directory(name: &str) -> Result<String> {
    stage(name).map(|s| s.directory_name())
}

/// All stages, in registry order.
pub fn stages_in_order() -> &'static [StageDescriptor] {
    STAGES
}

pub fn fatal(name: &str, workflow: Workflow) -> Result<bool> {
    stage(name).map(|s| s.is_fatal_for(workflow))
}

/// The stage immediately preceding `name` in registry order, if any.
/// Used as the default `from_stage` in `StageIO::get_input_path`.
pub fn preceding_stage(name: &str) -> Result<Option<&'static StageDescriptor>> {
    let idx = STAGES
        .iter()
        .position(|s| s.name == name)
        .ok_or_else(|| Error::UnknownStage(name.to_string()))?;
    Ok(idx.checked_sub(1).map(|i| &STAGES[i]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_numbers_are_exactly_one_through_n_with_no_gaps() {
        let mut numbers: Vec<u32> = STAGES.iter().map(|s| s.number).collect();
        numbers.sort_unstable();
        let expected: Vec<u32> = (1..=STAGES.len() as u32).collect();
        assert_eq!(numbers, expected);
    }

    #[test]
    fn directory_name_is_zero_padded_two_digits() {
        let d = stage_directory("asr").unwrap();
        assert_eq!(d, "06_asr");
    }

    #[test]
    fn unknown_stage_errors() {
        assert!(stage("not_a_stage").is_err());
    }

    #[test]
    fn translation_is_fatal_only_for_translate_and_subtitle() {
        assert!(fatal("translation", Workflow::Translate).unwrap());
        assert!(fatal("translation", Workflow::Subtitle).unwrap());
        // transcribe doesn't include translation in `participates_in`, but
        // the fatality table itself should still report it as non-fatal
        // there since transcribe isn't in the FatalFor list.
        assert!(!fatal("translation", Workflow::Transcribe).unwrap());
    }

    #[test]
    fn preceding_stage_of_first_is_none() {
        assert!(preceding_stage("demux").unwrap().is_none());
        assert_eq!(preceding_stage("tmdb").unwrap().unwrap().name, "demux");
    }
}
