use catalog::CatalogContext;
use foundation::{ModelId, TimeInterval};

/// Ordered list of the items the user is working with.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Workbench {
    items: Vec<ModelId>,
}

impl Workbench {
    pub fn items(&self) -> &[ModelId] {
        &self.items
    }

    pub fn set_items(&mut self, items: Vec<ModelId>) {
        self.items = items;
    }

    pub fn add(&mut self, id: ModelId) {
        if !self.contains(id.as_str()) {
            self.items.push(id);
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item != id);
        self.items.len() != before
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|item| item == id)
    }
}

/// Time-varying items on the timeline. The first item drives the clock.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimelineStack {
    items: Vec<ModelId>,
}

impl TimelineStack {
    pub fn items(&self) -> &[ModelId] {
        &self.items
    }

    pub fn set_items(&mut self, items: Vec<ModelId>) {
        self.items = items;
    }

    pub fn top(&self) -> Option<&ModelId> {
        self.items.first()
    }

    pub fn remove(&mut self, id: &str) {
        self.items.retain(|item| item != id);
    }

    /// Earliest start and latest stop over the top item's row intervals.
    pub fn clock_range(&self, ctx: &CatalogContext) -> Option<TimeInterval> {
        let top = self.top()?;
        ctx.read(|registry| {
            let table = registry.get(top.as_str())?.dereferenced().table()?.clone();
            table
                .time_intervals
                .iter()
                .flatten()
                .fold(None, |range: Option<TimeInterval>, interval| {
                    Some(match range {
                        None => *interval,
                        Some(r) => TimeInterval::new(
                            r.start.min(interval.start),
                            r.stop.max(interval.stop),
                        ),
                    })
                })
        })
    }
}
