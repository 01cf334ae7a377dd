use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelState {
    #[default]
    Closed,
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelEvent {
    BellClicked,
    PointerDown { inside_panel: bool },
    ItemClicked(String),
}

/// Read-state write requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelEffect {
    None,
    MarkAllRead,
    MarkRead(String),
}

impl PanelState {
    pub fn is_open(self) -> bool {
        self == Self::Open
    }

    pub fn transition(self, event: PanelEvent, unread_count: usize) -> (Self, PanelEffect) {
        match (self, event) {
            (Self::Closed, PanelEvent::BellClicked) if unread_count > 0 => {
                (Self::Open, PanelEffect::MarkAllRead)
            }
            (Self::Closed, PanelEvent::BellClicked) => (Self::Open, PanelEffect::None),
            (Self::Open, PanelEvent::BellClicked) => (Self::Closed, PanelEffect::None),
            (Self::Open, PanelEvent::PointerDown { inside_panel: false }) => {
                (Self::Closed, PanelEffect::None)
            }
            (Self::Open, PanelEvent::ItemClicked(id)) => (Self::Closed, PanelEffect::MarkRead(id)),
            (state, _) => (state, PanelEffect::None),
        }
    }
}
