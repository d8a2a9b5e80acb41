// Prompt text for the analyzer request

use clipscope_core::domain::AnalysisContext;

pub(crate) const SYSTEM_PROMPT: &str = "You are a gameplay coach. You receive frames sampled \
evenly from a short gameplay clip, in order. Describe what happens, point out mistakes and \
good decisions, and give concrete, actionable advice. Be specific to what is visible.";

/// User message text. Context fields are passed through verbatim.
pub(crate) fn user_prompt(context: &AnalysisContext, frame_count: usize) -> String {
    let mut out = String::new();

    if frame_count == 0 {
        out.push_str("No frames could be extracted from this clip; answer from the context only.\n");
    } else {
        out.push_str(&format!(
            "The following {} frame(s) come from one gameplay clip.\n",
            frame_count
        ));
    }

    if let Some(game) = &context.game {
        out.push_str(&format!("Game: {}\n", game));
    }
    if let Some(bio) = &context.bio {
        out.push_str(&format!("Player: {}\n", bio));
    }
    if let Some(notes) = &context.notes {
        out.push_str(&format!("Player notes: {}\n", notes));
    }
    if !context.focus_areas.is_empty() {
        out.push_str(&format!("Focus on: {}\n", context.focus_areas.join(", ")));
    }
    for (key, value) in &context.extra {
        out.push_str(&format!("{}: {}\n", key, value));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_includes_context_fields() {
        let context = AnalysisContext {
            game: Some("Valorant".to_string()),
            focus_areas: vec!["crosshair placement".to_string(), "utility".to_string()],
            ..Default::default()
        };
        let prompt = user_prompt(&context, 8);

        assert!(prompt.contains("8 frame(s)"));
        assert!(prompt.contains("Game: Valorant"));
        assert!(prompt.contains("Focus on: crosshair placement, utility"));
        assert!(!prompt.contains("Player notes"));
    }

    #[test]
    fn test_prompt_without_frames() {
        let prompt = user_prompt(&AnalysisContext::default(), 0);
        assert!(prompt.contains("No frames"));
    }
}
