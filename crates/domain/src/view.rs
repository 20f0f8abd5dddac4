/// Response shaping variant, chosen explicitly by the caller. `Summary` is
/// the externally documented shape; `Full` adds internal ids and timestamps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum View {
    #[default]
    Summary,
    Full,
}

impl View {
    pub fn as_str(self) -> &'static str {
        match self {
            View::Summary => "summary",
            View::Full => "full",
        }
    }

    pub fn parse(value: &str) -> Option<View> {
        match value {
            "summary" => Some(View::Summary),
            "full" => Some(View::Full),
            _ => None,
        }
    }
}
