//! Declarative element location for externally-owned markup.
//!
//! Each UI target the portal flow depends on is described as an ordered
//! list of matcher strategies. Strategies are tried in sequence and the
//! first one yielding at least one candidate wins; there is no merging
//! across strategies. When the portal markup drifts, targets are fixed
//! by adding or reordering matchers, not by restructuring the flow.

use chromiumoxide::{Element, Page};
use tracing::debug;

use crate::error::Result;

#[derive(Debug)]
pub enum Strategy {
    /// Plain CSS selector.
    Css(&'static str),
    /// Elements matching `selector` whose visible text contains one of
    /// `needles`, compared case-insensitively.
    Text {
        selector: &'static str,
        needles: &'static [&'static str],
    },
}

pub struct Target {
    pub name: &'static str,
    pub strategies: &'static [Strategy],
}

/// Interstitial "Log in" affordance shown by some portal states before
/// the email field exists. Optional: absence is not an error.
pub const LANDING_LOGIN: Target = Target {
    name: "landing log-in button",
    strategies: &[Strategy::Text { selector: "button, a", needles: &["log in"] }],
};

pub const EMAIL_INPUT: Target = Target {
    name: "email input",
    strategies: &[Strategy::Css(
        r#"input[name="email"], input[type="email"], input[id="email"]"#,
    )],
};

/// Fallback affordance when the login flow hides the email field.
pub const CONTINUE_WITH_EMAIL: Target = Target {
    name: "continue-with-email button",
    strategies: &[Strategy::Text { selector: "button", needles: &["continue with email"] }],
};

pub const ADVANCE_BUTTON: Target = Target {
    name: "continue button",
    strategies: &[
        Strategy::Text { selector: "button", needles: &["continue", "next"] },
        Strategy::Css(r#"button[type="submit"]"#),
    ],
};

pub const PASSWORD_INPUT: Target = Target {
    name: "password input",
    strategies: &[Strategy::Css(r#"input[name="password"], input[type="password"]"#)],
};

pub const SUBMIT_LOGIN: Target = Target {
    name: "log-in button",
    strategies: &[
        Strategy::Text { selector: "button", needles: &["continue", "log in"] },
        Strategy::Css(r#"button[type="submit"]"#),
    ],
};

/// Primary download affordance: anything visibly labelled PDF/Download.
pub const DOWNLOAD_TEXT: Target = Target {
    name: "invoice download link",
    strategies: &[Strategy::Text { selector: "a, button", needles: &["pdf", "download"] }],
};

/// Rows that might represent invoice entries. Diagnostic counting only,
/// never clicked.
pub const INVOICE_ROWS: Target = Target {
    name: "invoice rows",
    strategies: &[Strategy::Css(r#"[data-testid="invoice-row"], tr:has(td)"#)],
};

/// Last-resort download affordance: links addressed like an invoice.
pub const DOWNLOAD_ATTR: Target = Target {
    name: "invoice link",
    strategies: &[Strategy::Css(r#"a[href*="invoice"], a[href*="pdf"], a[download]"#)],
};

/// Candidates from the first strategy with a non-empty result, in
/// document order. An empty vec means every strategy came up dry.
pub async fn locate(page: &Page, target: &Target) -> Result<Vec<Element>> {
    for (index, strategy) in target.strategies.iter().enumerate() {
        let found = match strategy {
            Strategy::Css(selector) => page.find_elements(*selector).await.unwrap_or_default(),
            Strategy::Text { selector, needles } => {
                find_by_text(page, target.name, selector, needles).await?
            }
        };
        if !found.is_empty() {
            debug!(
                target = "invoice",
                ui_target = target.name,
                strategy = index,
                matches = found.len(),
                "located candidates"
            );
            return Ok(found);
        }
    }
    debug!(target = "invoice", ui_target = target.name, "no strategy matched");
    Ok(Vec::new())
}

/// CSS alone cannot express "visible text contains". A scripted pass
/// marks matching elements with a per-target attribute, which is then
/// queried like any other selector.
async fn find_by_text(
    page: &Page,
    name: &str,
    selector: &str,
    needles: &[&str],
) -> Result<Vec<Element>> {
    let attr = mark_attribute(name);
    let marked: u64 = page
        .evaluate(mark_by_text_js(&attr, selector, needles))
        .await?
        .into_value()
        .unwrap_or(0);
    if marked == 0 {
        return Ok(Vec::new());
    }
    Ok(page.find_elements(format!("[{attr}]")).await.unwrap_or_default())
}

fn mark_attribute(target_name: &str) -> String {
    let slug: String = target_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    format!("data-invoice-{slug}")
}

fn mark_by_text_js(attr: &str, selector: &str, needles: &[&str]) -> String {
    let args = serde_json::json!({ "attr": attr, "selector": selector, "needles": needles });
    format!(
        r#"(function(args) {{
  const needles = args.needles.map((n) => n.toLowerCase());
  for (const el of document.querySelectorAll('[' + args.attr + ']')) {{
    el.removeAttribute(args.attr);
  }}
  let marked = 0;
  for (const el of document.querySelectorAll(args.selector)) {{
    const text = (el.innerText || el.textContent || '').toLowerCase();
    if (needles.some((n) => text.includes(n))) {{
      el.setAttribute(args.attr, '');
      marked += 1;
    }}
  }}
  return marked;
}})({args})"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_attribute_is_a_valid_attribute_name() {
        let attr = mark_attribute("landing log-in button");
        assert_eq!(attr, "data-invoice-landing-log-in-button");
        assert!(attr.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }

    #[test]
    fn mark_js_escapes_inputs() {
        let js = mark_by_text_js("data-invoice-x", r#"a[title="q"]"#, &[r#"pd"f"#]);
        // Inputs travel as JSON, so embedded quotes stay escaped.
        assert!(js.contains(r#""a[title=\"q\"]""#));
        assert!(js.contains(r#""pd\"f""#));
    }

    #[test]
    fn text_strategies_precede_attribute_fallbacks() {
        assert!(matches!(ADVANCE_BUTTON.strategies[0], Strategy::Text { .. }));
        assert!(matches!(ADVANCE_BUTTON.strategies[1], Strategy::Css(_)));
        assert!(matches!(SUBMIT_LOGIN.strategies[0], Strategy::Text { .. }));
        assert!(matches!(DOWNLOAD_TEXT.strategies[0], Strategy::Text { .. }));
        assert!(matches!(DOWNLOAD_ATTR.strategies[0], Strategy::Css(_)));
    }

    #[test]
    fn download_needles_cover_both_labels() {
        match &DOWNLOAD_TEXT.strategies[0] {
            Strategy::Text { needles, .. } => {
                assert!(needles.contains(&"pdf"));
                assert!(needles.contains(&"download"));
            }
            other => panic!("expected text strategy, got {other:?}"),
        }
    }
}
