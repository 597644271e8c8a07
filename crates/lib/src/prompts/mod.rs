//! # Prompt Templates
//!
//! Default prompts for the three model-backed tasks. The server can override each
//! of them through `config.yml` or `prompt.yml`.

pub mod tasks;

/// Fills `{name}` placeholders in one pass, so substituted values are never
/// scanned for further placeholders.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut filled = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        filled.push_str(&rest[..open]);
        let tail = &rest[open..];
        let matched = values.iter().find_map(|(name, value)| {
            let placeholder_len = name.len() + 2;
            let is_match = tail.len() >= placeholder_len
                && tail[1..].starts_with(name)
                && tail[1 + name.len()..].starts_with('}');
            is_match.then_some((placeholder_len, *value))
        });
        match matched {
            Some((len, value)) => {
                filled.push_str(value);
                rest = &tail[len..];
            }
            None => {
                filled.push('{');
                rest = &tail[1..];
            }
        }
    }
    filled.push_str(rest);
    filled
}
