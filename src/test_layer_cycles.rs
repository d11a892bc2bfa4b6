// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

use crate::cache::KvCache;
use crate::config::{LayerOptions, Theme};
use crate::context::MapContext;
use crate::deeplink::{DeepLink, MemoryDeepLink, UnavailableDeepLink, preselect};
use crate::feature::{Feature, LatLng, Properties};
use crate::kinds::{LayerKind, strategy_for};
use crate::layer::{Layer, LayerControl};
use crate::popup::POPUP_REFRESH_DELAY;
use crate::render::{LayerRenderer, PanelContent, SidebarPanel};
use crate::resolver::ResolveOptions;
use crate::search::{search_layers, select_hit};
use crate::test_support::{RecordingMap, RecordingPanel, RecordingRenderer};
use geojson::{Geometry, Value as GeoValue};
use std::sync::Arc;
use tokio::time::Instant;

struct Harness {
    ctx: MapContext,
    map: Arc<RecordingMap>,
    panel: Arc<RecordingPanel>,
}

fn harness_with(deep_link: Arc<dyn DeepLink>) -> Harness {
    let map = Arc::new(RecordingMap::new(LatLng::new(0.0, 0.0), 10.0));
    let panel = Arc::new(RecordingPanel::default());
    let ctx = MapContext::new(
        map.clone(),
        deep_link,
        panel.clone(),
        KvCache::in_memory(),
        reqwest::Client::new(),
    );
    Harness { ctx, map, panel }
}

fn harness() -> Harness {
    harness_with(Arc::new(MemoryDeepLink::default()))
}

fn layer(h: &Harness, kind: LayerKind) -> Layer<RecordingRenderer> {
    Layer::new(
        kind.as_str(),
        strategy_for(kind, "https://birch.invalid", Theme::Light),
        RecordingRenderer::default(),
        h.ctx.clone(),
        LayerOptions {
            min_zoom: 4.0,
            max_zoom: 16.0,
            ..Default::default()
        },
    )
    .unwrap()
}

// no trip_id and a next_stop, so vehicle detail renders without a request
fn vehicle(id: &str, x: i64) -> Feature {
    Feature::new(
        id,
        Properties::new()
            .with("vehicle_id", format!("veh-{}", id))
            .with("route_short_name", "10")
            .with("next_stop", "Union Station")
            .with("x", x),
    )
}

fn assert_vehicle_detail(content: Option<PanelContent>, expected_id: &str) {
    match content {
        Some(PanelContent::Detail {
            entity_id,
            kind,
            records,
            pending,
            ..
        }) => {
            assert_eq!(entity_id, expected_id);
            assert_eq!(kind, LayerKind::Vehicles.as_str());
            assert!(records.is_empty());
            assert!(pending.is_empty());
        }
        other => panic!("expected vehicle detail, got {:?}", other),
    }
}

fn point(feature: Feature, lat: f64, lon: f64) -> Feature {
    feature.with_geometry(Geometry::new(GeoValue::Point(vec![lon, lat])))
}

fn stop(id: &str, name: &str) -> Feature {
    Feature::new(
        id,
        Properties::new().with("stop_id", id).with("stop_name", name),
    )
}

#[tokio::test]
async fn second_snapshot_updates_and_adds() {
    let h = harness();
    let mut layer = layer(&h, LayerKind::Vehicles);

    let first = layer.apply(vec![vehicle("v1", 1)]);
    assert_eq!(first.update.keys().collect::<Vec<_>>(), vec!["v1"]);
    let handle = layer.registry().handle_of("v1").unwrap();

    let second = layer.apply(vec![vehicle("v1", 2), vehicle("v2", 1)]);

    assert_eq!(second.cycle, 2);
    assert_eq!(second.update.keys().collect::<Vec<_>>(), vec!["v1", "v2"]);
    assert!(second.removed_ids.is_empty());
    assert_eq!(second.features.len(), 2);
    assert_eq!(
        layer.registry().get("v1").unwrap().feature.properties.get_f64("x"),
        Some(2.0)
    );
    // updated in place
    assert_eq!(layer.registry().handle_of("v1"), Some(handle));
    assert_eq!(layer.renderer().live_feature_ids(), vec!["v1", "v2"]);
}

#[tokio::test]
async fn exactly_one_listener_per_handle() {
    let h = harness();
    let mut layer = layer(&h, LayerKind::Vehicles);

    for cycle in 0..10 {
        layer.apply(vec![vehicle("v1", cycle), vehicle("v2", 0)]);
    }

    for id in ["v1", "v2"] {
        let handle = layer.registry().handle_of(id).unwrap();
        assert_eq!(layer.renderer().listeners_of(handle).len(), 1);
    }
    assert_eq!(layer.clicks().len(), 2);
}

#[tokio::test]
async fn removals_happen_before_creations() {
    let h = harness();
    let mut layer = layer(&h, LayerKind::Vehicles);

    layer.apply(vec![vehicle("a", 0)]);
    let event = layer.apply(vec![vehicle("b", 0)]);

    assert_eq!(event.removed_ids, vec!["a".to_string()]);
    assert_eq!(
        layer.renderer().events,
        vec!["create:a", "destroy:a", "create:b"]
    );
    assert!(layer.clicks().context_for(layer.registry().handle_of("b").unwrap()).is_some());
    assert_eq!(layer.clicks().len(), 1);
}

#[tokio::test]
async fn unchanged_features_are_skipped_with_content_detector() {
    let h = harness();
    let mut layer = Layer::new(
        "vehicles",
        strategy_for(LayerKind::Vehicles, "https://birch.invalid", Theme::Light),
        RecordingRenderer::default(),
        h.ctx.clone(),
        LayerOptions {
            change_detector: crate::diff::ChangeDetector::Content,
            ..Default::default()
        },
    )
    .unwrap();

    layer.apply(vec![vehicle("v1", 1)]);
    let event = layer.apply(vec![vehicle("v1", 1)]);
    assert!(event.update.is_empty());
    assert_eq!(event.features.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn open_popup_survives_update_and_refreshes() {
    let h = harness();
    let mut layer = layer(&h, LayerKind::Vehicles);

    layer.apply(vec![point(vehicle("v1", 1), 48.0, 2.0)]);
    let handle = layer.registry().handle_of("v1").unwrap();
    layer.renderer_mut().open_popup(handle);

    let moved = Feature::new(
        "v1",
        Properties::new()
            .with("vehicle_id", "veh-v1")
            .with("route_short_name", "12")
            .with("next_stop", "Civic Center"),
    );
    layer.apply(vec![point(moved, 48.5, 2.5)]);

    let renderer = layer.renderer();
    assert!(renderer.popup_is_open(handle));
    assert_eq!(renderer.close_count(handle), 1);
    assert_eq!(renderer.popup_of(handle).unwrap().title, "12");
    assert_eq!(h.map.view(), (LatLng::new(48.5, 2.5), 10.0));

    // nothing replayed before the delay
    assert!(layer.run_due_refreshes(Instant::now()).is_empty());
    assert_eq!(
        layer.next_refresh_due(),
        Some(Instant::now() + POPUP_REFRESH_DELAY)
    );

    tokio::time::advance(POPUP_REFRESH_DELAY).await;
    let replayed = layer.run_due_refreshes(Instant::now());
    assert_eq!(replayed.len(), 1);
    assert!(layer.next_refresh_due().is_none());

    let outcome = replayed.into_iter().next().unwrap();
    assert_eq!(outcome.entity_id, "veh-v1");
    outcome.detail_task.await.unwrap();
    match h.panel.last_rendered() {
        Some(PanelContent::Detail { properties, .. }) => {
            assert_eq!(properties.get_string("route_short_name").as_deref(), Some("12"));
        }
        other => panic!("expected refreshed detail, got {:?}", other),
    }
    assert_vehicle_detail(h.panel.last_rendered(), "veh-v1");
}

#[tokio::test]
async fn closed_popup_is_not_refreshed() {
    let h = harness();
    let mut layer = layer(&h, LayerKind::Vehicles);

    layer.apply(vec![vehicle("v1", 1)]);
    layer.apply(vec![vehicle("v1", 2)]);

    let handle = layer.registry().handle_of("v1").unwrap();
    assert_eq!(layer.renderer().close_count(handle), 0);
    assert!(layer.next_refresh_due().is_none());
    assert!(h.map.history.lock().unwrap().is_empty());
}

#[tokio::test]
async fn click_sets_deep_link_and_opens_sidebar() {
    let link = Arc::new(MemoryDeepLink::default());
    let h = harness_with(link.clone());
    let mut layer = layer(&h, LayerKind::Vehicles);

    layer.apply(vec![vehicle("v1", 1)]);
    let handle = layer.registry().handle_of("v1").unwrap();
    let listener = layer.renderer().listeners_of(handle)[0];

    let outcome = layer.on_listener(listener).unwrap();

    assert!(outcome.stop_propagation);
    assert!(outcome.deep_link_set);
    assert_eq!(link.fragment().as_deref(), Some("veh-v1"));
    assert_eq!(h.ctx.sidebar.visible(), SidebarPanel::Secondary);
    assert!(h.panel.is_visible(SidebarPanel::Secondary));
    assert!(!h.panel.is_visible(SidebarPanel::Primary));

    outcome.detail_task.await.unwrap();
    let rendered = h.panel.rendered();
    assert_eq!(rendered.len(), 2);
    assert_eq!(
        rendered[0],
        PanelContent::Loading {
            entity_id: "veh-v1".to_string()
        }
    );
    assert_vehicle_detail(rendered.into_iter().nth(1), "veh-v1");
}

#[tokio::test]
async fn vehicle_without_trip_or_next_stop_shows_partial_detail() {
    let h = harness();
    let mut layer = layer(&h, LayerKind::Vehicles);

    layer.apply(vec![Feature::new(
        "v9",
        Properties::new()
            .with("vehicle_id", "veh-v9")
            .with("route_short_name", "720"),
    )]);
    let outcome = layer.click_feature("v9").unwrap();

    // wait for the first render after loading, not the background infill
    for _ in 0..50 {
        if h.panel.rendered().len() >= 2 {
            break;
        }
        tokio::task::yield_now().await;
    }

    let rendered = h.panel.rendered();
    match rendered.get(1) {
        Some(PanelContent::Detail {
            entity_id,
            properties,
            pending,
            ..
        }) => {
            assert_eq!(entity_id, "veh-v9");
            assert_eq!(properties.get_string("route_short_name").as_deref(), Some("720"));
            assert_eq!(pending, &vec!["next_stop".to_string()]);
        }
        other => panic!("expected partial detail, got {:?}", other),
    }
    assert!(!rendered.iter().any(|c| matches!(c, PanelContent::NotFound { .. })));
    outcome.detail_task.abort();
}

#[tokio::test]
async fn deep_link_failure_does_not_block_sidebar() {
    let h = harness_with(Arc::new(UnavailableDeepLink));
    let mut layer = layer(&h, LayerKind::Vehicles);

    layer.apply(vec![vehicle("v1", 1)]);
    let outcome = layer.click_feature("v1").unwrap();

    assert!(!outcome.deep_link_set);
    assert_eq!(h.ctx.sidebar.current_entity().as_deref(), Some("veh-v1"));
    outcome.detail_task.await.unwrap();
    assert_eq!(h.panel.rendered().len(), 2);
}

#[tokio::test]
async fn removed_feature_has_no_click() {
    let h = harness();
    let mut layer = layer(&h, LayerKind::Vehicles);

    layer.apply(vec![vehicle("v1", 1)]);
    let handle = layer.registry().handle_of("v1").unwrap();
    let listener = layer.renderer().listeners_of(handle)[0];
    layer.apply(vec![]);

    assert!(layer.on_listener(listener).is_none());
    assert!(layer.click(handle).is_none());
}

#[tokio::test]
async fn resolve_miss_restores_viewport() {
    let h = harness();
    let mut layer = layer(&h, LayerKind::Vehicles);
    layer.apply(vec![vehicle("v1", 1)]);

    assert!(
        layer
            .resolve_entity("nope", &ResolveOptions::default())
            .is_none()
    );
    assert_eq!(h.map.view(), (LatLng::new(0.0, 0.0), 10.0));
    assert_eq!(layer.renderer().clustering_history, vec![false, true]);
}

#[tokio::test]
async fn resolve_hit_zooms_and_clicks() {
    let link = Arc::new(MemoryDeepLink::default());
    let h = harness_with(link.clone());
    let mut layer = layer(&h, LayerKind::Vehicles);
    layer.apply(vec![point(vehicle("v1", 1), 34.0, -118.0)]);

    let resolution = layer
        .resolve_entity("veh-v1", &ResolveOptions::default())
        .unwrap();

    assert_eq!(resolution.feature_id, "v1");
    assert_eq!(h.map.view(), (LatLng::new(34.0, -118.0), 16.0));
    // zoomed out to the layer minimum while scanning
    assert_eq!(h.map.history.lock().unwrap()[0].1, 4.0);
    assert_eq!(link.fragment().as_deref(), Some("veh-v1"));
    resolution.click.unwrap().detail_task.await.unwrap();
}

#[tokio::test]
async fn deep_link_preselects_across_layers() {
    let link = Arc::new(MemoryDeepLink::new(Some("#vehicles:veh-v2".to_string())));
    let h = harness_with(link.clone());

    let mut stops = layer(&h, LayerKind::Stops);
    let mut vehicles = layer(&h, LayerKind::Vehicles);
    stops.apply(vec![stop("veh-v2", "Not a vehicle")]);
    vehicles.apply(vec![vehicle("v1", 1), vehicle("v2", 1)]);

    let resolution = {
        let mut layers: [&mut dyn LayerControl; 2] = [&mut stops, &mut vehicles];
        preselect(link.as_ref(), &mut layers, &ResolveOptions::default()).unwrap()
    };

    assert_eq!(resolution.feature_id, "v2");
    // the stops layer was skipped, so it never toggled clustering
    assert!(stops.renderer().clustering_history.is_empty());
    resolution.click.unwrap().detail_task.await.unwrap();

    let missing = MemoryDeepLink::new(Some("stops:nowhere".to_string()));
    let mut layers: [&mut dyn LayerControl; 2] = [&mut stops, &mut vehicles];
    assert!(preselect(&missing, &mut layers, &ResolveOptions::default()).is_none());
}

#[tokio::test]
async fn search_ranks_id_matches_before_exact_matches() {
    let h = harness();
    let mut stops = layer(&h, LayerKind::Stops);
    let mut vehicles = layer(&h, LayerKind::Vehicles);

    stops.apply(vec![
        stop("s1", "Union Station"),
        stop("s2", "Union"),
        stop("s3", "Downtown"),
        stop("union", "Central Plaza"),
    ]);
    vehicles.apply(vec![Feature::new(
        "v1",
        Properties::new()
            .with("vehicle_id", "1234")
            .with("route_short_name", "10")
            .with("trip_headsign", "Union Station"),
    )]);

    let all: [&dyn LayerControl; 2] = [&stops, &vehicles];
    let hits = search_layers(&all, "  UNION ", 10);
    let ids: Vec<_> = hits.iter().map(|h| h.feature_id.as_str()).collect();
    // id match, then exact name, then substring
    assert_eq!(ids, vec!["union", "s2", "v1", "s1"]);
    assert!(hits[0].id_match);
    assert!(hits[1].exact && !hits[1].id_match);
    assert_eq!(hits[2].entity_id, "1234");
    assert_eq!(hits[2].kind, LayerKind::Vehicles);

    assert_eq!(search_layers(&all, "union", 2).len(), 2);
    assert!(search_layers(&all, "   ", 10).is_empty());

    let options = ResolveOptions {
        click: false,
        ..Default::default()
    };
    let mut layers: [&mut dyn LayerControl; 2] = [&mut stops, &mut vehicles];
    let resolution = select_hit(&mut layers, &hits[0], &options).unwrap();
    assert_eq!(resolution.feature_id, "union");
    assert!(resolution.click.is_none());
    let resolution = select_hit(&mut layers, &hits[1], &options).unwrap();
    assert_eq!(resolution.feature_id, "s2");
}

#[tokio::test]
async fn selecting_hit_resolves_its_own_feature_when_public_ids_collide() {
    let h = harness();
    let mut vehicles = layer(&h, LayerKind::Vehicles);

    vehicles.apply(vec![
        Feature::new(
            "metro-7",
            Properties::new()
                .with("vehicle_id", "7")
                .with("trip_headsign", "Metro Bus"),
        ),
        Feature::new(
            "bart-7",
            Properties::new()
                .with("vehicle_id", "7")
                .with("trip_headsign", "Bart"),
        ),
    ]);

    let all: [&dyn LayerControl; 1] = [&vehicles];
    let hits = search_layers(&all, "metro", 10);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].feature_id, "metro-7");
    assert_eq!(hits[0].entity_id, "7");

    let options = ResolveOptions {
        click: false,
        ..Default::default()
    };
    let mut layers: [&mut dyn LayerControl; 1] = [&mut vehicles];
    let resolution = select_hit(&mut layers, &hits[0], &options).unwrap();
    assert_eq!(resolution.feature_id, "metro-7");
    assert_eq!(
        vehicles.registry().handle_of("metro-7"),
        Some(resolution.handle)
    );
}

#[tokio::test]
async fn teardown_destroys_everything() {
    let h = harness();
    let mut layer = layer(&h, LayerKind::Vehicles);
    layer.apply(vec![vehicle("v1", 1), vehicle("v2", 1)]);

    layer.teardown();

    assert!(layer.registry().is_empty());
    assert!(layer.clicks().is_empty());
    assert!(layer.renderer().handles.is_empty());

    // reusable afterwards
    let event = layer.apply(vec![vehicle("v1", 1)]);
    assert_eq!(event.update.len(), 1);
    assert_eq!(layer.renderer().live_feature_ids(), vec!["v1"]);
}
