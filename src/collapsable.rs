//! Registry of popups that close when the user clicks outside them.
//!
//! Owned by the app shell. Components subscribe when they mount, record
//! where they were drawn, and unsubscribe when they go away.

use ratatui::layout::{Position, Rect};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CollapsableId(u64);

#[derive(Debug)]
struct Handler {
    id: CollapsableId,
    open: bool,
    area: Option<Rect>,
    // Clicks on the trigger toggle the popup themselves; never auto-close on them.
    trigger: Option<Rect>,
}

#[derive(Debug, Default)]
pub struct CollapsableRegistry {
    handlers: Vec<Handler>,
    next_id: u64,
}

impl CollapsableRegistry {
    pub fn new() -> CollapsableRegistry {
        CollapsableRegistry::default()
    }

    pub fn subscribe(&mut self) -> CollapsableId {
        self.next_id += 1;
        let id = CollapsableId(self.next_id);
        self.handlers.push(Handler {
            id,
            open: false,
            area: None,
            trigger: None,
        });
        id
    }

    pub fn unsubscribe(&mut self, id: CollapsableId) {
        self.handlers.retain(|h| h.id != id);
    }

    fn handler_mut(&mut self, id: CollapsableId) -> Option<&mut Handler> {
        self.handlers.iter_mut().find(|h| h.id == id)
    }

    pub fn is_open(&self, id: CollapsableId) -> bool {
        self.handlers.iter().any(|h| h.id == id && h.open)
    }

    pub fn set_open(&mut self, id: CollapsableId, open: bool) {
        if let Some(handler) = self.handler_mut(id) {
            handler.open = open;
        }
    }

    pub fn toggle(&mut self, id: CollapsableId) {
        if let Some(handler) = self.handler_mut(id) {
            handler.open = !handler.open;
        }
    }

    /// Records where the popup was last drawn.
    pub fn set_area(&mut self, id: CollapsableId, area: Rect) {
        if let Some(handler) = self.handler_mut(id) {
            handler.area = Some(area);
        }
    }

    pub fn set_trigger(&mut self, id: CollapsableId, trigger: Rect) {
        if let Some(handler) = self.handler_mut(id) {
            handler.trigger = Some(trigger);
        }
    }

    pub fn close_all(&mut self) {
        for handler in &mut self.handlers {
            handler.open = false;
        }
    }

    pub fn any_open(&self) -> bool {
        self.handlers.iter().any(|h| h.open)
    }

    /// Closes every open popup that neither contains the click nor was
    /// triggered by it. Returns the ids that were closed.
    pub fn handle_click(&mut self, column: u16, row: u16) -> Vec<CollapsableId> {
        let pos = Position::new(column, row);
        let mut closed = Vec::new();
        for handler in self.handlers.iter_mut().filter(|h| h.open) {
            let inside = handler.area.is_some_and(|a| a.contains(pos));
            let on_trigger = handler.trigger.is_some_and(|t| t.contains(pos));
            if !inside && !on_trigger {
                handler.open = false;
                closed.push(handler.id);
            }
        }
        closed
    }
}
