/// Instruction turn that opens every conversation, on first use and after
/// every reset.
pub const CLASSIFIER_PREAMBLE: &str = r#"You are a travel assistant. Classify every message I send after this one into exactly one of three categories and answer with a single tuple literal, nothing else.

"Type_1": I want to travel somewhere today. Extract the start and end locations. If I do not state a start location, use "null" for it.
Reply as ("Type_1", ["start location", "end location"]).

"Type_2": I am asking about the current weather of a place. Extract that place. If I do not state a place, use "null".
Reply as ("Type_2", "location").

"Type_3": anything else. Answer the message normally.
Reply as ("Type_3", "your answer").

Always enclose the tag in double quotes, for example "Type_1"."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_all_three_tags() {
        for tag in ["\"Type_1\"", "\"Type_2\"", "\"Type_3\""] {
            assert!(CLASSIFIER_PREAMBLE.contains(tag));
        }
    }
}
