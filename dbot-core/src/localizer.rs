//! Localization contract consumed by sessions and prompts.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait Localizer: Send + Sync {
    /// Prepares translations for `locale`.
    async fn load(&self, locale: &str) -> Result<()>;

    /// Localized text for `msgid`, or `msgid` itself when no entry exists.
    fn gettext(&self, locale: &str, msgid: &str, namespace: Option<&str>) -> String;

    fn ngettext(
        &self,
        locale: &str,
        msgid: &str,
        msgid_plural: &str,
        count: u64,
        namespace: Option<&str>,
    ) -> String {
        if count == 1 {
            self.gettext(locale, msgid, namespace)
        } else {
            self.gettext(locale, msgid_plural, namespace)
        }
    }

    fn default_locale(&self) -> String;
}

/// Localizer that returns every message id unchanged.
#[derive(Debug, Clone)]
pub struct PassthroughLocalizer {
    locale: String,
}

impl PassthroughLocalizer {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
        }
    }
}

impl Default for PassthroughLocalizer {
    fn default() -> Self {
        Self::new("en")
    }
}

#[async_trait]
impl Localizer for PassthroughLocalizer {
    async fn load(&self, _locale: &str) -> Result<()> {
        Ok(())
    }

    fn gettext(&self, _locale: &str, msgid: &str, _namespace: Option<&str>) -> String {
        msgid.to_string()
    }

    fn default_locale(&self) -> String {
        self.locale.clone()
    }
}

/// Substitutes printf-style placeholders (`%s`, `%d`, `%i`, `%f`, `%%`) positionally.
///
/// Missing arguments leave the placeholder in place.
pub fn format_template(template: &str, args: &[String]) -> String {
    if args.is_empty() {
        return template.to_string();
    }
    let mut out = String::with_capacity(template.len());
    let mut next = args.iter();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some(spec @ ('s' | 'd' | 'i' | 'f')) => {
                chars.next();
                match next.next() {
                    Some(arg) => out.push_str(arg),
                    None => {
                        out.push('%');
                        out.push(spec);
                    }
                }
            }
            _ => out.push('%'),
        }
    }
    out
}
