//! The Configuration Resolver (C1): merges pipeline defaults, the job
//! record's overrides, and runtime environment overrides into one immutable
//! `PipelineConfig`, lowest to highest precedence (§4.1).

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;
use tracing::warn;

use crate::error::{ConfigError, ConfigResult};
use crate::kdl_layer::parse_defaults;
use crate::pipeline_config::PipelineConfig;

/// One layer of raw, untyped key/value overrides, lowest to highest applied
/// in the order the caller passes them to `resolve`.
pub type RawLayer = BTreeMap<String, Value>;

fn convert<T: serde::de::DeserializeOwned>(field: &str, value: &Value) -> ConfigResult<T> {
    serde_json::from_value(value.clone()).map_err(|e| ConfigError::InvalidValue {
        field: field.to_string(),
        message: e.to_string(),
    })
}

/// Turn a string-valued environment-override layer into a raw layer,
/// coercing each value to bool/number/string by sniffing its shape. Used
/// because process environment variables are always strings on the wire but
/// most recognized config fields are not.
pub fn env_layer_from_strings(vars: BTreeMap<String, String>) -> RawLayer {
    vars.into_iter()
        .map(|(k, v)| (k, coerce_scalar(&v)))
        .collect()
}

fn coerce_scalar(raw: &str) -> Value {
    if let Ok(b) = raw.parse::<bool>() {
        return Value::Bool(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

/// Apply one raw layer onto a `PipelineConfig` in place. Recognized keys are
/// type-checked and set on the typed field; unrecognized keys are retained
/// in `extra` and logged as a warning rather than failing the resolve (§4.1).
fn apply_layer(cfg: &mut PipelineConfig, layer: &RawLayer) -> ConfigResult<()> {
    for (key, value) in layer {
        match key.as_str() {
            "asr-model" => cfg.asr.model_id = convert(key, value)?,
            "asr-device" => cfg.asr.device = convert(key, value)?,
            "asr-precision" => cfg.asr.precision = convert(key, value)?,
            "asr-batch-size" => cfg.asr.batch_size = convert(key, value)?,
            "asr-beam-width" => cfg.asr.beam_width = convert(key, value)?,
            "asr-best-of" => cfg.asr.best_of = convert(key, value)?,
            "asr-temperature-schedule" => cfg.asr.temperature_schedule = convert(key, value)?,
            "asr-no-speech-threshold" => cfg.asr.no_speech_threshold = convert(key, value)?,
            "asr-logprob-threshold" => cfg.asr.logprob_threshold = convert(key, value)?,
            "asr-compression-ratio-threshold" => {
                cfg.asr.compression_ratio_threshold = convert(key, value)?
            }
            "asr-condition-on-previous" => cfg.asr.condition_on_previous = convert(key, value)?,

            "bias-strategy" => cfg.bias.strategy = convert(key, value)?,
            "bias-window" => cfg.bias.window = convert(key, value)?,
            "bias-stride" => cfg.bias.stride = convert(key, value)?,
            "bias-top-k" => cfg.bias.top_k = convert(key, value)?,

            "anti-hallucination-max-repeated-ngram" => {
                cfg.anti_hallucination.max_repeated_ngram = convert(key, value)?
            }
            "anti-hallucination-repetition-penalty" => {
                cfg.anti_hallucination.repetition_penalty = convert(key, value)?
            }

            "vad-onset" => cfg.vad.onset = convert(key, value)?,
            "vad-offset" => cfg.vad.offset = convert(key, value)?,
            "vad-merge-gap-seconds" => cfg.vad.merge_gap_seconds = convert(key, value)?,
            "vad-min-speech-duration-seconds" => {
                cfg.vad.min_speech_duration_seconds = convert(key, value)?
            }
            "vad-min-silence-duration-seconds" => {
                cfg.vad.min_silence_duration_seconds = convert(key, value)?
            }

            "diarization-enabled" => cfg.diarization.enabled = convert(key, value)?,
            "lyrics-detection-threshold" => cfg.lyrics_detection.threshold = convert(key, value)?,

            "multi-pass-threshold" => cfg.multi_pass.threshold = convert(key, value)?,
            "multi-pass-max-iterations" => cfg.multi_pass.max_iterations = convert(key, value)?,
            "multi-pass-beam-increment" => cfg.multi_pass.beam_increment = convert(key, value)?,

            "log-level" => cfg.log_level = convert(key, value)?,

            _ if key.starts_with("cache-roots.") => {
                let framework = key.trim_start_matches("cache-roots.").to_string();
                let path: String = convert(key, value)?;
                cfg.cache_roots.insert(framework, PathBuf::from(path));
            }

            _ => {
                warn!(key = %key, "unrecognized configuration key, retaining verbatim");
                cfg.extra.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(())
}

/// `resolve(pipeline_defaults, job_record, env_overrides) -> PipelineConfig` (§4.1).
///
/// `pipeline_defaults_kdl` is the text of the well-known defaults file.
/// `job_overrides` and `env_overrides` are raw layers, applied in that order
/// on top of the typed defaults produced from the KDL layer.
pub fn resolve(
    pipeline_defaults_kdl: &str,
    job_overrides: &RawLayer,
    env_overrides: &RawLayer,
) -> ConfigResult<PipelineConfig> {
    let defaults_layer = parse_defaults(pipeline_defaults_kdl)?;

    let mut cfg = PipelineConfig::default();
    apply_layer(&mut cfg, &defaults_layer)?;
    apply_layer(&mut cfg, job_overrides)?;
    apply_layer(&mut cfg, env_overrides)?;

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_alone_produce_sensible_config() {
        let cfg = resolve("", &BTreeMap::new(), &BTreeMap::new()).unwrap();
        assert_eq!(cfg.asr.model_id, "large-v3");
    }

    #[test]
    fn precedence_env_beats_job_beats_defaults() {
        let defaults = r#"asr-beam-width 5"#;
        let mut job_overrides = BTreeMap::new();
        job_overrides.insert("asr-beam-width".to_string(), serde_json::json!(8));
        let mut env_overrides = BTreeMap::new();
        env_overrides.insert("asr-beam-width".to_string(), serde_json::json!(12));

        let cfg = resolve(defaults, &job_overrides, &BTreeMap::new()).unwrap();
        assert_eq!(cfg.asr.beam_width, 8);

        let cfg = resolve(defaults, &job_overrides, &env_overrides).unwrap();
        assert_eq!(cfg.asr.beam_width, 12);
    }

    #[test]
    fn unknown_key_is_retained_not_rejected() {
        let mut job_overrides = BTreeMap::new();
        job_overrides.insert("totally-made-up-key".to_string(), serde_json::json!(42));
        let cfg = resolve("", &job_overrides, &BTreeMap::new()).unwrap();
        assert_eq!(cfg.extra["totally-made-up-key"], serde_json::json!(42));
    }

    #[test]
    fn bad_type_is_rejected_naming_the_key() {
        let mut job_overrides = BTreeMap::new();
        job_overrides.insert(
            "asr-beam-width".to_string(),
            serde_json::json!("not-a-number"),
        );
        let err = resolve("", &job_overrides, &BTreeMap::new()).unwrap_err();
        match err {
            ConfigError::InvalidValue { field, .. } => assert_eq!(field, "asr-beam-width"),
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn env_string_layer_coerces_scalars() {
        let mut raw = BTreeMap::new();
        raw.insert("asr-beam-width".to_string(), "9".to_string());
        raw.insert("diarization-enabled".to_string(), "true".to_string());
        let layer = env_layer_from_strings(raw);
        let cfg = resolve("", &BTreeMap::new(), &layer).unwrap();
        assert_eq!(cfg.asr.beam_width, 9);
        assert!(cfg.diarization.enabled);
    }

    #[test]
    fn cache_roots_layer_from_kdl_nested_table() {
        let defaults = r#"
            cache-roots {
                whisperx "/opt/cache/whisperx"
            }
        "#;
        let cfg = resolve(defaults, &BTreeMap::new(), &BTreeMap::new()).unwrap();
        assert_eq!(
            cfg.cache_roots["whisperx"],
            PathBuf::from("/opt/cache/whisperx")
        );
    }
}
