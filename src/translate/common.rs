use crate::subtitle::split_blocks;

/// Split SRT text into groups of at most `group_size` blocks, each group rejoined
/// with blank-line separators. The last group holds the remainder.
pub fn group_blocks(content: &str, group_size: usize) -> Vec<String> {
    let blocks = split_blocks(content);
    blocks
        .chunks(group_size.max(1))
        .map(|group| group.join("\n\n"))
        .collect()
}

/// Build the instruction prompt for one group
pub fn build_translation_prompt(group_text: &str, target_language: &str) -> String {
    let language_name = language_code_to_name(target_language);

    format!(
        "You are a professional subtitle translator.\n\
         Translate the following subtitle text to {language_name}.\n\
         \n\
         Rules:\n\
         1. Maintain the original SRT format structure exactly. Do not change sequence numbers or timestamps.\n\
         2. Translate only the dialogue text, using natural, conversational {language_name}.\n\
         3. Keep names and recurring terms consistent.\n\
         4. Output ONLY the translated content, no markdown code blocks and no explanations.\n\
         5. Do not omit, merge or split any lines.\n\
         \n\
         Input:\n\
         {group_text}\n"
    )
}

/// Remove a surrounding ``` fence (with optional language tag) and trim
pub fn strip_code_fences(response: &str) -> String {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };

    // Only a bare language tag is dropped; anything else on the fence line is content
    let body = match rest.split_once('\n') {
        Some((info, body)) if is_language_tag(info.trim()) => body,
        _ => rest,
    };
    let body = body.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);
    body.trim().to_string()
}

fn is_language_tag(info: &str) -> bool {
    info.is_empty()
        || (info.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+'))
            && !info.chars().all(|c| c.is_ascii_digit()))
}

/// Convert language code to full language name for clearer prompts
pub fn language_code_to_name(code: &str) -> String {
    match code.to_lowercase().as_str() {
        "ko" => "Korean".to_string(),
        "ja" => "Japanese".to_string(),
        "zh" => "Chinese".to_string(),
        "zh-tw" => "Traditional Chinese".to_string(),
        "en" => "English".to_string(),
        "fr" => "French".to_string(),
        "de" => "German".to_string(),
        "es" => "Spanish".to_string(),
        "ru" => "Russian".to_string(),
        "it" => "Italian".to_string(),
        "pt" => "Portuguese".to_string(),
        "pl" => "Polish".to_string(),
        "nl" => "Dutch".to_string(),
        "tr" => "Turkish".to_string(),
        "ar" => "Arabic".to_string(),
        "hi" => "Hindi".to_string(),
        "th" => "Thai".to_string(),
        "vi" => "Vietnamese".to_string(),
        "id" => "Indonesian".to_string(),
        "sv" => "Swedish".to_string(),
        "uk" => "Ukrainian".to_string(),
        _ => code.to_string(), // Fallback to the code itself if not found
    }
}
