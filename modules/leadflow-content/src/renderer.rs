//! Content rendering collaborator.
//!
//! The engine depends only on [`ContentRenderer`]; call sites must treat a
//! render failure as a degraded fallback, never an error surfaced to their
//! own callers.

use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::warn;

use leadflow_common::MessageChannel;

use crate::template::{enforce_mobile_rules, resolve_vars, MOBILE_MAX_LEN};

/// Rendered message content for one channel.
#[derive(Debug, Clone)]
pub struct RenderedContent {
    pub subject: Option<String>,
    pub body: String,
    pub metadata: HashMap<String, String>,
}

impl RenderedContent {
    /// Degraded fallback when rendering fails. Carries the template id so
    /// the failure is visible in logs and audit details.
    pub fn degraded(template_id: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("degraded".to_string(), "true".to_string());
        metadata.insert("template_id".to_string(), template_id.to_string());
        Self {
            subject: None,
            body: String::new(),
            metadata,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.metadata.get("degraded").map(String::as_str) == Some("true")
    }
}

#[async_trait]
pub trait ContentRenderer: Send + Sync {
    /// Render a template for a channel, personalized for one lead.
    async fn render(
        &self,
        template_id: &str,
        personalization: &HashMap<String, String>,
        channel: MessageChannel,
        lang: &str,
    ) -> Result<RenderedContent>;
}

// ---------------------------------------------------------------------------
// TemplateCatalog — in-memory registry of authored templates
// ---------------------------------------------------------------------------

/// One language variant of a template.
#[derive(Debug, Clone)]
pub struct TemplateVariant {
    pub language: String,
    pub subject: Option<String>,
    pub body: String,
}

/// Holds authored templates keyed by template id. Variant selection picks
/// the first variant matching the requested language, falling back to the
/// full variant list when no language matches.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: HashMap<String, Vec<TemplateVariant>>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(
        mut self,
        template_id: impl Into<String>,
        variants: Vec<TemplateVariant>,
    ) -> Self {
        self.templates.insert(template_id.into(), variants);
        self
    }

    fn select_variant<'a>(
        &'a self,
        template_id: &str,
        lang: &str,
    ) -> Result<&'a TemplateVariant> {
        let variants = match self.templates.get(template_id) {
            Some(v) if !v.is_empty() => v,
            _ => bail!("unknown template: {template_id}"),
        };

        Ok(variants
            .iter()
            .find(|v| v.language == lang)
            .unwrap_or(&variants[0]))
    }
}

#[async_trait]
impl ContentRenderer for TemplateCatalog {
    async fn render(
        &self,
        template_id: &str,
        personalization: &HashMap<String, String>,
        channel: MessageChannel,
        lang: &str,
    ) -> Result<RenderedContent> {
        let variant = self.select_variant(template_id, lang)?;

        let body = resolve_vars(&variant.body, personalization);
        let subject = variant
            .subject
            .as_ref()
            .map(|s| resolve_vars(s, personalization));

        let (body, truncated) = match channel {
            MessageChannel::Sms | MessageChannel::Whatsapp => {
                enforce_mobile_rules(&body, MOBILE_MAX_LEN)
            }
            _ => (body, false),
        };
        if truncated {
            warn!(template_id, %channel, "Mobile content truncated");
        }

        let mut metadata = HashMap::new();
        metadata.insert("template_id".to_string(), template_id.to_string());
        metadata.insert("lang".to_string(), variant.language.clone());

        Ok(RenderedContent {
            subject,
            body,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> TemplateCatalog {
        TemplateCatalog::new().with_template(
            "intro_email",
            vec![
                TemplateVariant {
                    language: "en".to_string(),
                    subject: Some("Hello {{first_name}}".to_string()),
                    body: "Hi {{first_name}}, meet {{product}}.".to_string(),
                },
                TemplateVariant {
                    language: "es".to_string(),
                    subject: Some("Hola {{first_name}}".to_string()),
                    body: "Hola {{first_name}}.".to_string(),
                },
            ],
        )
    }

    fn personalization() -> HashMap<String, String> {
        HashMap::from([
            ("first_name".to_string(), "Ada".to_string()),
            ("product".to_string(), "neon signs".to_string()),
        ])
    }

    #[tokio::test]
    async fn renders_language_variant() {
        let content = catalog()
            .render("intro_email", &personalization(), MessageChannel::Email, "es")
            .await
            .unwrap();
        assert_eq!(content.body, "Hola Ada.");
        assert_eq!(content.subject.as_deref(), Some("Hola Ada"));
    }

    #[tokio::test]
    async fn falls_back_to_first_variant_for_unknown_language() {
        let content = catalog()
            .render("intro_email", &personalization(), MessageChannel::Email, "de")
            .await
            .unwrap();
        assert_eq!(content.body, "Hi Ada, meet neon signs.");
    }

    #[tokio::test]
    async fn unknown_template_is_an_error() {
        let result = catalog()
            .render("missing", &personalization(), MessageChannel::Email, "en")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn mobile_channels_get_mobile_rules() {
        let catalog = TemplateCatalog::new().with_template(
            "nudge_sms",
            vec![TemplateVariant {
                language: "en".to_string(),
                subject: None,
                body: "Click here: {{short_url}}".to_string(),
            }],
        );
        let vars = HashMap::from([("short_url".to_string(), "bit.ly/x".to_string())]);
        let content = catalog
            .render("nudge_sms", &vars, MessageChannel::Sms, "en")
            .await
            .unwrap();
        assert_eq!(content.body, "Tap!: bit.ly/x");
    }

    #[test]
    fn degraded_content_is_marked() {
        let content = RenderedContent::degraded("intro_email");
        assert!(content.is_degraded());
        assert!(content.body.is_empty());
    }
}
