//! Prompt text for the streaming transcription loop.

/// Prompt for the first turn of a session.
pub fn initial_prompt(language: &str) -> String {
    let language_instruction = if language == "auto" {
        String::new()
    } else {
        format!("Transcribe in {}.\n", language)
    };

    format!(
        r#"I have uploaded an audio file. Analyze it completely and transcribe the entire conversation.
{language_instruction}
Output Format: JSONL (JSON Lines).
1. The FIRST line must be a metadata object:
   {{ "speakers": ["Name1", "Name2"], "language": "Language" }}

2. All subsequent lines must be compact JSON arrays representing segments:
   [start_time, end_time, "Speaker Name", "Text content"]

Schema details:
- start_time: float (seconds)
- end_time: float (seconds)
- Speaker Name: string (real name if identified, else "Speaker A")
- Text content: string (combined paragraph)

Instructions:
1. Identify speakers and use their real names.
2. CRITICAL: Combine ALL consecutive speech from the same speaker into ONE segment (paragraph). Do not split into single sentences.
3. Ensure valid JSON on each line.
4. When finished, output [END] on a new line.
"#
    )
}

/// Prompt used when the previous turn ended on a truncated line.
pub const RESUME_PROMPT: &str = "Continue transcription from where you stopped.\n\
IMPORTANT: Start with a COMPLETE JSON object on a new line.\n\
Do not try to continue the truncated line - start fresh with the next segment.\n\
Output strictly JSONL format.";

/// Prompt used between ordinary turns.
pub const CONTINUE_PROMPT: &str =
    "Continue transcription. Output strictly JSONL arrays. Do not repeat the last segment.";
