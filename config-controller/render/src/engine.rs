use serde_json::Value;
use thiserror::Error;

/// The rendering-engine contract. The engine is a pure function from a
/// template and a context tree to output text; everything else about it is
/// someone else's problem.
pub trait Renderer {
    fn render(&self, template: &str, context: &Value) -> Result<String, RenderError>;
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unterminated substitution opened at offset {0}")]
    Unterminated(usize),

    #[error("render failed: {0}")]
    Failed(String),
}

/// A minimal substitution engine: `{{dotted.path}}` looks up the context
/// tree by object key or array index. Scalars render as themselves; a
/// missing key renders empty with a warning.
#[derive(Clone, Copy, Debug, Default)]
pub struct VarRenderer;

// === impl VarRenderer ===

impl Renderer for VarRenderer {
    fn render(&self, template: &str, context: &Value) -> Result<String, RenderError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        let mut offset = 0;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or(RenderError::Unterminated(offset + start))?;
            out.push_str(&lookup(context, after[..end].trim()));
            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

fn lookup(context: &Value, path: &str) -> String {
    let mut current = context;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => match map.get(segment) {
                Some(value) => value,
                None => return missing(path),
            },
            Value::Array(items) => {
                match segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                    Some(value) => value,
                    None => return missing(path),
                }
            }
            _ => return missing(path),
        };
    }
    match current {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn missing(path: &str) -> String {
    tracing::warn!(key = path, "no context value for substitution, rendering empty");
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_scalars_and_paths() {
        let context = json!({
            "port": 100,
            "http2": true,
            "listeners": [{"routes": [{"path": "/a"}]}],
        });
        let rendered = VarRenderer
            .render(
                "port={{port}} http2={{http2}} path={{listeners.0.routes.0.path}}",
                &context,
            )
            .unwrap();
        assert_eq!(rendered, "port=100 http2=true path=/a");
    }

    #[test]
    fn missing_keys_render_empty() {
        let rendered = VarRenderer
            .render("[{{nope}}]", &json!({"port": 1}))
            .unwrap();
        assert_eq!(rendered, "[]");
    }

    #[test]
    fn unterminated_substitution_is_an_error() {
        assert!(matches!(
            VarRenderer.render("x {{port", &json!({})),
            Err(RenderError::Unterminated(2))
        ));
    }

    #[test]
    fn literal_text_passes_through() {
        let rendered = VarRenderer.render("no substitutions", &json!({})).unwrap();
        assert_eq!(rendered, "no substitutions");
    }
}
