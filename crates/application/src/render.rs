use poh_engine::RgbaBitmap;

/// Hands out render tickets; only the newest ticket may show its bitmap.
#[derive(Debug, Default)]
pub struct RenderGate {
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTicket {
    generation: u64,
    pub page: u32,
}

#[derive(Debug, Clone)]
pub enum RenderOutcome {
    Rendered { page: u32, bitmap: RgbaBitmap },
    /// A newer render started before this one finished.
    Superseded,
}

impl RenderGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, page: u32) -> RenderTicket {
        self.generation += 1;
        RenderTicket {
            generation: self.generation,
            page,
        }
    }

    pub fn is_current(&self, ticket: RenderTicket) -> bool {
        ticket.generation == self.generation
    }

    /// Supersedes every outstanding ticket.
    pub fn cancel_all(&mut self) {
        self.generation += 1;
    }

    pub fn finish(&self, ticket: RenderTicket, bitmap: RgbaBitmap) -> RenderOutcome {
        if self.is_current(ticket) {
            RenderOutcome::Rendered {
                page: ticket.page,
                bitmap,
            }
        } else {
            tracing::debug!("dropping superseded render of page {}", ticket.page);
            RenderOutcome::Superseded
        }
    }
}
