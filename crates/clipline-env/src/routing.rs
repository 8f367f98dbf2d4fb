//! Environment routing policy (§4.3): resolves an `AsrRouted` or
//! `TranslationRouted` requirement from the Stage Registry into a concrete
//! environment name, given a hardware capability report and a language pair.

use clipline_core::HardwareCapabilityReport;

/// ISO 639-1 codes for languages IndicTrans2 covers. Not exhaustive of every
/// Indian language IndicTrans2 supports, but enough to route the pairs this
/// pipeline is expected to see; extend here as new languages are onboarded.
const INDIC_LANGUAGES: &[&str] = &[
    "hi", "bn", "gu", "kn", "ml", "mr", "or", "pa", "ta", "te", "ur", "as", "ne",
];

fn is_indic(code: &str) -> bool {
    INDIC_LANGUAGES.contains(&code)
}

/// `Apple-Silicon + MPS + optimized backend available ⇒ MLX; otherwise ⇒ WhisperX` (§4.3).
pub fn route_asr_environment(report: &HardwareCapabilityReport) -> &'static str {
    if report.mlx_eligible() { "mlx" } else { "whisperx" }
}

/// `Indic↔Indic or Indic↔English ⇒ IndicTrans2; other pairs ⇒ NLLB` (§4.3).
pub fn route_translation_environment(source_language: &str, target_language: &str) -> &'static str {
    let source_indic = is_indic(source_language);
    let target_indic = is_indic(target_language);
    let source_english = source_language == "en";
    let target_english = target_language == "en";

    let indic_pair = (source_indic && target_indic)
        || (source_indic && target_english)
        || (target_indic && source_english);

    if indic_pair { "indictrans2" } else { "nllb" }
}
