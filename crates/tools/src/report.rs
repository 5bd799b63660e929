use std::collections::BTreeMap;

use app::Application;
use catalog::{CatalogContext, Model};
use foundation::format_date_time;
use runtime::EventKind;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct EventReport {
    pub kind: &'static str,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StateReport {
    pub phase: String,
    pub app_name: String,
    pub viewer_mode: &'static str,
    pub catalog_root: String,
    pub catalog: Vec<String>,
    pub models: usize,
    pub init_sources: usize,
    pub workbench: Vec<String>,
    pub timeline: Vec<String>,
    pub clock: Option<(String, String)>,
    pub user_properties: BTreeMap<String, String>,
    pub events: Vec<EventReport>,
}

impl StateReport {
    pub fn from_application(app: &Application) -> Self {
        let root = app.catalog_root();
        let catalog = app.catalog().read(|registry| {
            registry
                .get(root.as_str())
                .map(Model::dereferenced)
                .and_then(Model::as_group)
                .map(|group| group.member_ids().iter().map(|id| id.to_string()).collect())
                .unwrap_or_default()
        });
        Self {
            phase: format!("{:?}", app.phase()),
            app_name: app.parameters().app_name,
            viewer_mode: app.main_viewer().mode_name(),
            catalog_root: root.to_string(),
            catalog,
            models: app.catalog().read(|registry| registry.len()),
            init_sources: app.init_sources().len(),
            workbench: app.workbench().items().iter().map(|id| id.to_string()).collect(),
            timeline: app.timeline().items().iter().map(|id| id.to_string()).collect(),
            clock: app
                .clock_range()
                .map(|range| (format_date_time(range.start), format_date_time(range.stop))),
            user_properties: app.user_properties(),
            events: app
                .events()
                .into_iter()
                .map(|event| EventReport {
                    kind: match event.kind {
                        EventKind::Error => "error",
                        EventKind::Notification => "notification",
                    },
                    title: event.title,
                    message: event.message,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LegendItemReport {
    pub title: String,
    pub color: String,
}

#[derive(Debug, Serialize)]
pub struct TableReport {
    pub id: String,
    pub rows: usize,
    pub style: Option<String>,
    pub showing_regions: bool,
    pub region_column: Option<String>,
    pub time_column: Option<String>,
    pub legend: Vec<LegendItemReport>,
    /// Rows per symbol color.
    pub colors: BTreeMap<String, usize>,
}

impl TableReport {
    pub fn from_model(ctx: &CatalogContext, id: &str) -> Option<Self> {
        ctx.read(|registry| {
            let table = registry.get(id)?.dereferenced().table()?.clone();
            let mut colors = BTreeMap::new();
            for feature in &table.features {
                *colors.entry(feature.symbol.color.clone()).or_insert(0) += 1;
            }
            Some(Self {
                id: id.to_string(),
                rows: table.features.len(),
                style: table.style_id.clone(),
                showing_regions: table.showing_regions,
                region_column: table.region_column.clone(),
                time_column: table.time_column.clone(),
                legend: table
                    .legends
                    .iter()
                    .flat_map(|legend| &legend.items)
                    .map(|item| LegendItemReport {
                        title: item.title.clone(),
                        color: item.color.clone(),
                    })
                    .collect(),
                colors,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use app::{Application, RecordingMapEngine};
    use catalog::InMemorySettingsStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use streaming::StaticFetcher;

    use super::{StateReport, TableReport};

    #[tokio::test]
    async fn state_report_lists_catalog_and_workbench() {
        let app = Application::new(
            Arc::new(StaticFetcher::new()),
            Arc::new(RecordingMapEngine::new()),
            Box::new(InMemorySettingsStore::new()),
        );
        let init = json!({
            "catalog": [{"type": "csv", "id": "counts", "name": "Counts",
                         "csvString": "kind,count\na,1\nb,5\nc,9\n"}],
            "workbench": ["counts"],
            "viewerMode": "2d"
        });
        app.apply_init_data(init.as_object().cloned().unwrap(), false)
            .await
            .unwrap();

        let report = StateReport::from_application(&app);
        assert_eq!(report.catalog, vec!["counts"]);
        assert_eq!(report.workbench, vec!["counts"]);
        assert_eq!(report.viewer_mode, "2d");
        assert!(report.events.is_empty());

        let table = TableReport::from_model(app.catalog(), "counts").unwrap();
        assert_eq!(table.rows, 3);
        assert_eq!(table.style.as_deref(), Some("count"));
        assert_eq!(table.colors.values().sum::<usize>(), 3);
        assert!(TableReport::from_model(app.catalog(), "missing").is_none());
    }
}
