//! `{token}` substitution for directory and output path templates.

use chrono::Local;

/// Today's local date as used by the `{date}` token.
pub fn today() -> String {
    Local::now().format("%Y%m%d").to_string()
}

/// Replace every `{name}` in `template` by its value.
///
/// The template is scanned once, left to right, so substituted values are
/// never expanded again. Unknown tokens are left in place.
pub fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let token = after.find('}').and_then(|end| {
            let name = &after[..end];
            vars.iter()
                .find(|(var, _)| *var == name)
                .map(|(_, value)| (*value, end))
        });
        match token {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
