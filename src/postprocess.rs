// src/postprocess.rs

//! Cleans raw generated text into a single persona turn.
//!
//! The model is expected to echo the prompt and then speak as the persona,
//! ending the turn with a sentinel. Everything here is plain substring
//! scanning over well-defined markers; no pattern language.

/// End-of-turn delimiter the model emits between dialogue turns.
pub const TURN_DELIMITER: &str = "</s>";

/// Control tokens stripped in the degraded no-marker path.
const SENTINELS: &[&str] = &["</s>", "<|end_of_text|>", "<|eot_id|>"];

/// The persona's speaking marker as it appears in prompts and output.
pub fn speaking_marker(persona: &str) -> String {
    format!("{persona} (speaking):")
}

/// Extract the persona's first reply from raw model output.
///
/// Locates the first speaking marker, truncates at the first end-of-turn
/// delimiter, drops lines that exactly repeat an earlier line (generation
/// loops), and rejoins with single spaces. When the marker is missing the
/// raw output is returned with sentinels stripped — degraded, never fatal.
pub fn clean(raw_output: &str, persona: &str) -> String {
    let marker = speaking_marker(persona);

    let Some(pos) = raw_output.find(&marker) else {
        return strip_sentinels(raw_output);
    };
    let candidate = &raw_output[pos + marker.len()..];

    // Keep only the persona's own turn; anything past the delimiter is a
    // hallucinated continuation.
    let turn = match candidate.find(TURN_DELIMITER) {
        Some(end) => &candidate[..end],
        None => candidate,
    };

    let mut seen: Vec<&str> = Vec::new();
    for line in turn.lines() {
        let line = line.trim();
        if line.is_empty() || seen.contains(&line) {
            continue;
        }
        seen.push(line);
    }
    seen.join(" ")
}

fn strip_sentinels(raw: &str) -> String {
    let mut out = raw.to_string();
    for sentinel in SENTINELS {
        out = out.replace(sentinel, "");
    }
    out.trim().to_string()
}
