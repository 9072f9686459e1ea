use live_voice_types::FunctionDeclaration;
use serde_json::{Value, json};

fn object(properties: Value, required: &[&str]) -> Option<Value> {
    Some(json!({
        "type": "object",
        "properties": properties,
        "required": required,
    }))
}

fn no_arguments() -> Option<Value> {
    None
}

/// Declarations of every command verb, for the session setup message.
pub fn function_declarations() -> Vec<FunctionDeclaration> {
    let subject = json!({
        "type": "string",
        "description": "Subject name or slug. Omit to use the subject on screen."
    });
    vec![
        FunctionDeclaration::new(
            "navigate",
            "Open a top level page of the app.",
            object(
                json!({
                    "destination": {
                        "type": "string",
                        "enum": ["home", "dashboard", "subjects", "settings", "profile", "braille", "story mode", "quiz"]
                    }
                }),
                &["destination"],
            ),
        ),
        FunctionDeclaration::new(
            "openLesson",
            "Open a lesson inside a chapter, optionally a specific kind of content.",
            object(
                json!({
                    "subject": subject.clone(),
                    "chapterNumber": { "type": "integer", "description": "1-based chapter number" },
                    "lessonNumber": { "type": "integer", "description": "1-based lesson number within the chapter" },
                    "contentType": { "type": "string", "enum": ["article", "video", "quiz", "practice"] }
                }),
                &["chapterNumber"],
            ),
        ),
        FunctionDeclaration::new(
            "openChapter",
            "Open a chapter of a subject.",
            object(
                json!({
                    "subject": subject.clone(),
                    "chapterNumber": { "type": "integer", "description": "1-based chapter number" }
                }),
                &["chapterNumber"],
            ),
        ),
        FunctionDeclaration::new(
            "lessonControl",
            "Control the lesson player.",
            object(
                json!({
                    "action": {
                        "type": "string",
                        "enum": ["play", "pause", "resume", "stop", "next", "previous", "restart"]
                    }
                }),
                &["action"],
            ),
        ),
        FunctionDeclaration::new("listSubjects", "List the subjects the learner can study.", no_arguments()),
        FunctionDeclaration::new(
            "listChapters",
            "List the chapters of a subject.",
            object(json!({ "subject": subject.clone() }), &[]),
        ),
        FunctionDeclaration::new(
            "convertBraille",
            "Transcribe text into braille.",
            object(json!({ "text": { "type": "string" } }), &["text"]),
        ),
        FunctionDeclaration::new("toggleFocusMode", "Turn focus mode on or off.", no_arguments()),
        FunctionDeclaration::new("openStoryMode", "Open story mode.", no_arguments()),
        FunctionDeclaration::new("openBraille", "Open the braille tools.", no_arguments()),
        FunctionDeclaration::new(
            "setLanguage",
            "Change the interface language.",
            object(
                json!({
                    "language": { "type": "string", "description": "Language code or English name, e.g. \"hi\" or \"Hindi\"" }
                }),
                &["language"],
            ),
        ),
        FunctionDeclaration::new("toggleLargeText", "Turn large text on or off.", no_arguments()),
        FunctionDeclaration::new("toggleCaptions", "Turn captions on or off.", no_arguments()),
        FunctionDeclaration::new("toggleSigns", "Turn sign language video on or off.", no_arguments()),
        FunctionDeclaration::new("toggleReduceMotion", "Turn reduced motion on or off.", no_arguments()),
        FunctionDeclaration::new(
            "quizSelectOption",
            "Select an answer in the quiz on screen.",
            object(
                json!({
                    "option": { "type": "string", "description": "Letter (a, b, c...) or 1-based number of the option" }
                }),
                &["option"],
            ),
        ),
        FunctionDeclaration::new("quizSubmit", "Submit the quiz on screen.", no_arguments()),
        FunctionDeclaration::new(
            "scrollPage",
            "Scroll the current page.",
            object(
                json!({
                    "direction": { "type": "string", "enum": ["up", "down", "top", "bottom"] },
                    "amount": { "type": "integer", "description": "Screens to scroll, default 1" }
                }),
                &["direction"],
            ),
        ),
        FunctionDeclaration::new(
            "navigateHistory",
            "Go back or forward in page history.",
            object(
                json!({
                    "direction": { "type": "string", "enum": ["back", "forward"] },
                    "steps": { "type": "integer", "description": "Pages to move, default 1" }
                }),
                &[],
            ),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::VERBS;

    #[test]
    fn test_declarations_cover_verbs() {
        let declarations = function_declarations();
        let names: Vec<&str> = declarations.iter().map(|d| d.name()).collect();
        assert_eq!(names, VERBS);
    }

    #[test]
    fn test_required_fields_are_declared() {
        for declaration in function_declarations() {
            let Some(parameters) = declaration.parameters() else {
                continue;
            };
            let properties = parameters["properties"].as_object().unwrap();
            for required in parameters["required"].as_array().unwrap() {
                assert!(
                    properties.contains_key(required.as_str().unwrap()),
                    "{} requires an undeclared {}",
                    declaration.name(),
                    required
                );
            }
        }
    }
}
