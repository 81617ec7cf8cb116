//! Block helpers: `{{#each}}` and `{{#if}} … {{else}} … {{/if}}`.
//!
//! Blocks are expanded innermost-first (the last opening tag in the string
//! has no blocks inside its body). A guard halts processing after 100
//! expansions; whatever blocks remain are emitted unexpanded.

use serde_json::Value;
use tracing::warn;

use super::expression::{is_truthy, parse, Evaluator};
use super::functions::coerce_array;
use super::{resolve_expressions, TemplateError};
use crate::domain::ports::OnstaqApi;

const MAX_BLOCK_EXPANSIONS: usize = 100;

pub(crate) async fn process_blocks(
    input: &str,
    roots: &Value,
    api: &dyn OnstaqApi,
    workspace_id: &str,
) -> Result<String, TemplateError> {
    let mut current = input.to_string();

    for _ in 0..MAX_BLOCK_EXPANSIONS {
        let Some(open_start) = current.rfind("{{#") else {
            return Ok(current);
        };

        let Some(expanded) = expand_one(&current, open_start, roots, api, workspace_id).await?
        else {
            // Malformed block (no closing tag): emit as-is.
            warn!("unterminated block helper left unexpanded");
            return Ok(current);
        };
        current = expanded;
    }

    if current.contains("{{#") {
        warn!("block expansion guard tripped after {MAX_BLOCK_EXPANSIONS} iterations");
    }
    Ok(current)
}

/// Expand the block opening at `open_start`. Returns `None` when the block
/// has no closing tag.
async fn expand_one(
    input: &str,
    open_start: usize,
    roots: &Value,
    api: &dyn OnstaqApi,
    workspace_id: &str,
) -> Result<Option<String>, TemplateError> {
    let header_rest = &input[open_start..];
    let Some(header_len) = header_rest.find("}}") else {
        return Ok(None);
    };
    let header = header_rest[3..header_len].trim();
    let body_start = open_start + header_len + 2;

    let (helper, expr_text) = match header.split_once(char::is_whitespace) {
        Some((helper, rest)) => (helper, rest.trim()),
        None => (header, ""),
    };

    let close_tag = format!("{{{{/{helper}}}}}");
    let Some(close_rel) = input[body_start..].find(&close_tag) else {
        return Ok(None);
    };
    let body = &input[body_start..body_start + close_rel];
    let close_end = body_start + close_rel + close_tag.len();

    let replacement = match helper {
        "each" => expand_each(expr_text, body, roots, api, workspace_id).await?,
        "if" => expand_if(expr_text, body, roots, api, workspace_id).await?,
        other => {
            warn!("unknown block helper '{{{{#{other}}}}}', dropped");
            String::new()
        }
    };

    let mut out = String::with_capacity(input.len() + replacement.len());
    out.push_str(&input[..open_start]);
    out.push_str(&replacement);
    out.push_str(&input[close_end..]);
    Ok(Some(out))
}

/// `{{#each collection}}`: iterate, binding `currentItem` to each element.
/// `{{@index}}`, `{{@first}}`, `{{@last}}` are substituted eagerly; all other
/// expressions in the body resolve under the element-scoped context.
async fn expand_each(
    expr_text: &str,
    body: &str,
    roots: &Value,
    api: &dyn OnstaqApi,
    workspace_id: &str,
) -> Result<String, TemplateError> {
    let elements = match parse(expr_text) {
        Ok(expr) => {
            let evaluator = Evaluator::new(roots, api, workspace_id);
            coerce_array(&evaluator.eval(&expr).await?)
        }
        Err(_) => Vec::new(),
    };

    let count = elements.len();
    let mut out = String::new();
    for (index, element) in elements.into_iter().enumerate() {
        let iteration = body
            .replace("{{@index}}", &index.to_string())
            .replace("{{@first}}", if index == 0 { "true" } else { "false" })
            .replace(
                "{{@last}}",
                if index + 1 == count { "true" } else { "false" },
            );

        let mut scoped = roots.clone();
        scoped["currentItem"] = element.clone();
        scoped["item"] = element;
        out.push_str(&resolve_expressions(&iteration, &scoped, api, workspace_id).await?);
    }
    Ok(out)
}

/// `{{#if expr}} … [{{else}} …] {{/if}}`: the condition is either a binary
/// comparison or a truthiness test; both are ordinary expressions here.
async fn expand_if(
    expr_text: &str,
    body: &str,
    roots: &Value,
    api: &dyn OnstaqApi,
    workspace_id: &str,
) -> Result<String, TemplateError> {
    let passed = match parse(expr_text) {
        Ok(expr) => {
            let evaluator = Evaluator::new(roots, api, workspace_id);
            is_truthy(&evaluator.eval(&expr).await?)
        }
        Err(_) => false,
    };

    let (then_part, else_part) = match body.find("{{else}}") {
        Some(split) => (&body[..split], &body[split + "{{else}}".len()..]),
        None => (body, ""),
    };

    Ok(if passed { then_part } else { else_part }.to_string())
}
