pub mod renderer;
pub mod template;

pub use renderer::{ContentRenderer, RenderedContent, TemplateCatalog, TemplateVariant};
pub use template::{enforce_mobile_rules, resolve_vars, MOBILE_MAX_LEN};
