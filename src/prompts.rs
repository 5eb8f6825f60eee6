use crate::models::ImageMode;

pub const SHOOTING_PLAN: &str = include_str!("../data/prompts/shooting_plan.txt");
pub const SCENE_DESCRIPTION: &str = include_str!("../data/prompts/scene_description.txt");
pub const DIRECT_IMAGE: &str = include_str!("../data/prompts/direct_image.txt");
pub const SUGGESTIONS_SYSTEM: &str = include_str!("../data/prompts/suggestions_system.txt");
pub const SUGGESTIONS_SINGLE: &str = include_str!("../data/prompts/suggestions_single.txt");
pub const SUGGESTIONS_COMBINED: &str = include_str!("../data/prompts/suggestions_combined.txt");

/// Replace `{{key}}` placeholders in a template string.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{{{}}}}}", key), value);
    }
    result
}

/// Directive text for an image mode with the caller's prompt folded in.
pub fn image_instruction(mode: ImageMode, prompt: &str) -> String {
    let template = match mode {
        ImageMode::ShootingPlan => SHOOTING_PLAN,
        ImageMode::SceneDescription => SCENE_DESCRIPTION,
        ImageMode::DirectImage => DIRECT_IMAGE,
    };
    render(template, &[("prompt", prompt)]).trim_end().to_string()
}

/// User turn for the suggestions call; several files ask for a combined scene.
pub fn suggestions_instruction(file_count: usize) -> &'static str {
    if file_count > 1 {
        SUGGESTIONS_COMBINED.trim()
    } else {
        SUGGESTIONS_SINGLE.trim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_single_var() {
        assert_eq!(
            render("Hello {{name}}!", &[("name", "world")]),
            "Hello world!"
        );
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        assert_eq!(render("{{a}} {{b}}", &[("a", "x")]), "x {{b}}");
    }

    #[test]
    fn test_image_templates_have_prompt_placeholder() {
        for template in [SHOOTING_PLAN, SCENE_DESCRIPTION, DIRECT_IMAGE] {
            assert!(template.contains("{{prompt}}"));
        }
    }

    #[test]
    fn test_image_instruction_embeds_prompt() {
        for mode in [
            ImageMode::ShootingPlan,
            ImageMode::SceneDescription,
            ImageMode::DirectImage,
        ] {
            let text = image_instruction(mode, "studio lighting shot");
            assert!(text.contains("studio lighting shot"));
            assert!(!text.contains("{{prompt}}"));
        }
    }

    #[test]
    fn test_shooting_plan_uses_bracket_headings() {
        assert!(SHOOTING_PLAN.contains("【撮影コンセプト】"));
    }

    #[test]
    fn test_suggestions_instruction_depends_on_file_count() {
        assert_eq!(suggestions_instruction(1), SUGGESTIONS_SINGLE.trim());
        assert_eq!(suggestions_instruction(3), SUGGESTIONS_COMBINED.trim());
        assert!(!SUGGESTIONS_SYSTEM.is_empty());
    }
}
