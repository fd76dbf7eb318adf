/// The static instructions of the assistant. A date prefix is added to
/// them on every turn.
pub const SYSTEM_PROMPT: &str = include_str!("./system_prompt.md");
