use serde::{Deserialize, Serialize};

/// Single-page-app mode of a navigation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Spa {
    #[default]
    Auto,
    /// Always perform a full navigation.
    Off,
}

/// How a navigation is recorded in history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryMode {
    #[default]
    Push,
    Replace,
}

/// Whether the viewport is adjusted after a navigation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollMode {
    #[default]
    Auto,
    Off,
}

/// Who initiated a location change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// A caller of `navigate`/`set_value`.
    #[default]
    Caller,
    /// The host moved on its own (back/forward); it must not be re-applied.
    Popstate,
}

/// Per-call navigation settings.
///
/// Every field is optional; the defaults describe an in-place, scrolling,
/// history-pushing navigation in the current context. Deserializes from
/// camelCase JSON, so link attributes can be fed through directly.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NavigationOptions {
    pub href: Option<String>,
    /// Name of the browsing context; `None`, `""` and `"_self"` mean the
    /// current one.
    pub target: Option<String>,
    pub referrer: Option<String>,
    pub spa: Spa,
    pub history: HistoryMode,
    pub scroll: ScrollMode,
    /// Correlation id, passed through untouched.
    pub id: Option<String>,
    pub source: Source,
}

impl NavigationOptions {
    /// Options for navigating to `href`.
    pub fn to(href: impl Into<String>) -> Self {
        Self {
            href: Some(href.into()),
            ..Default::default()
        }
    }

    pub fn replace(mut self) -> Self {
        self.history = HistoryMode::Replace;
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn spa(mut self, spa: Spa) -> Self {
        self.spa = spa;
        self
    }

    pub fn scroll(mut self, scroll: ScrollMode) -> Self {
        self.scroll = scroll;
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub(crate) fn popstate() -> Self {
        Self {
            source: Source::Popstate,
            ..Default::default()
        }
    }

    /// Whether the navigation targets a context other than the current one.
    pub fn targets_other_context(&self) -> bool {
        matches!(self.target.as_deref(), Some(t) if !t.is_empty() && t != "_self")
    }
}
