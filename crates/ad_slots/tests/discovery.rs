//! Marker discovery, registration commands and the refresh pass.

mod common;

use ad_slots::{
    Breakpoint, ManagerConfig, RecordingService, ServiceCall, ServiceSettings, SizeMapping,
    SlotHandle, TargetingValue,
};
use anyhow::Result;
use common::{Page, find_tag, size};
use dom::{DOMUpdate, NodeKey, fragment_updates};
use tokio::time::Instant;

const PAGE: &str = r#"<!doctype html>
<html><body>
  <div id="leaderboard" class="pubad" data-pos="top"
       data-targeting='{"section":"news","tags":["local","sport"],"page":2}'></div>
  <main>
    <p>Story</p>
    <div class="pubad" data-pos="sidebar"></div>
  </main>
  <div class="article"><div class="pubad"></div></div>
</body></html>"#;

#[tokio::test]
async fn third_marker_without_id_gets_positional_id() -> Result<()> {
    let mut page = Page::load(PAGE, 800)?;
    page.activate().await?;
    let report = page.manager.discover().expect("manager is active");
    page.settle();

    assert_eq!(report.registered, vec!["leaderboard", "ad-slot-1", "ad-slot-2"]);
    assert_eq!(report.assigned_ids, vec!["ad-slot-1", "ad-slot-2"]);

    let third = page.manager.dom_index().elements_by_class("pubad")[2];
    assert_eq!(page.document.attribute(third, "id"), Some("ad-slot-2"));
    assert_eq!(page.manager.dom_index().element_by_id("ad-slot-2"), Some(third));
    assert_eq!(
        page.defined_ids(),
        vec!["leaderboard", "ad-slot-1", "ad-slot-2"]
    );
    Ok(())
}

#[tokio::test]
async fn slot_without_sizes_is_still_registered() -> Result<()> {
    let mut page = Page::load(PAGE, 800)?;
    page.activate().await?;
    page.manager.discover();
    page.settle();

    let sidebar = page.manager.registry().get("ad-slot-1").expect("registered");
    assert_eq!(sidebar.position, "sidebar");
    assert!(sidebar.sizes.is_empty());
    assert!(page.journal.snapshot().contains(&ServiceCall::DefineSlot {
        unit_path: "1234567/rede/site".to_owned(),
        sizes: Vec::new(),
        element_id: "ad-slot-1".to_owned(),
        handle: Some(SlotHandle(2)),
    }));

    let unmarked = page.manager.registry().get("ad-slot-2").expect("registered");
    assert_eq!(unmarked.position, "default");
    assert_eq!(unmarked.sizes, vec![size(300, 250)]);
    Ok(())
}

#[tokio::test]
async fn discovery_before_activation_does_nothing() -> Result<()> {
    let mut page = Page::load(PAGE, 800)?;
    assert!(page.manager.discover().is_none());
    page.settle();

    assert!(page.manager.registry().is_empty());
    assert!(page.journal.snapshot().is_empty());
    let third = page.manager.dom_index().elements_by_class("pubad")[2];
    assert_eq!(page.document.attribute(third, "id"), None);
    Ok(())
}

#[tokio::test]
async fn repeated_discovery_yields_same_registry() -> Result<()> {
    let mut page = Page::load(PAGE, 1200)?;
    page.activate().await?;
    page.manager.discover();
    page.settle();
    let snapshot = |page: &Page| {
        page.manager
            .registry()
            .ids()
            .into_iter()
            .map(|id| {
                let sizes = page.manager.registry().get(id).map(|slot| slot.sizes.clone());
                (id.to_owned(), sizes)
            })
            .collect::<Vec<_>>()
    };
    let first = snapshot(&page);

    let report = page.manager.discover().expect("manager is active");
    page.settle();
    assert!(report.assigned_ids.is_empty(), "ids were already written back");
    assert_eq!(snapshot(&page), first);
    assert_eq!(first.len(), 3);

    let mut positions = Vec::new();
    page.manager
        .registry()
        .for_each(|_, slot| positions.push(slot.position.clone()));
    positions.sort();
    assert_eq!(positions, vec!["default", "sidebar", "top"]);
    Ok(())
}

#[tokio::test]
async fn registration_applies_mapping_targeting_then_display() -> Result<()> {
    let mut page = Page::load(PAGE, 800)?;
    page.activate().await?;
    page.manager.discover();
    page.settle();

    let calls = page.journal.snapshot();
    let handle = SlotHandle(1);
    let top = page.manager.positions().get("top").clone();
    assert_eq!(calls[0], ServiceCall::Enable(ServiceSettings::default()));
    assert_eq!(
        calls[1..6],
        [
            ServiceCall::DefineSlot {
                unit_path: "1234567/rede/site".to_owned(),
                sizes: vec![size(728, 90)],
                element_id: "leaderboard".to_owned(),
                handle: Some(handle),
            },
            ServiceCall::ApplySizeMapping {
                handle,
                mapping: top,
            },
            ServiceCall::ApplyTargeting {
                handle,
                key: "section".to_owned(),
                value: TargetingValue::Single("news".to_owned()),
            },
            ServiceCall::ApplyTargeting {
                handle,
                key: "tags".to_owned(),
                value: TargetingValue::Multi(vec!["local".to_owned(), "sport".to_owned()]),
            },
            ServiceCall::ApplyTargeting {
                handle,
                key: "page".to_owned(),
                value: TargetingValue::Single("2".to_owned()),
            },
        ]
    );
    assert_eq!(
        calls[6],
        ServiceCall::Display {
            element_id: "leaderboard".to_owned()
        }
    );
    Ok(())
}

#[tokio::test]
async fn mapping_without_sizes_is_not_applied() -> Result<()> {
    let html = r#"<html><body><div id="gap" class="pubad" data-pos="spacer"></div></body></html>"#;
    let mut page = Page::load(html, 800)?;
    assert!(page.manager.add_position(
        "spacer",
        SizeMapping::new(vec![Breakpoint::new(0, Vec::new())])
    ));
    page.activate().await?;
    page.manager.discover();
    page.settle();

    let calls = page.journal.snapshot();
    assert!(
        !calls
            .iter()
            .any(|call| matches!(call, ServiceCall::ApplySizeMapping { .. }))
    );
    assert_eq!(
        calls.last(),
        Some(&ServiceCall::Display {
            element_id: "gap".to_owned()
        })
    );
    Ok(())
}

#[tokio::test]
async fn refused_registration_skips_only_that_slot() -> Result<()> {
    let (service, journal) = RecordingService::new();
    let service = service.fail_definitions_for(["ad-slot-1"]);
    let mut page = Page::load_with(PAGE, 800, ManagerConfig::default(), service, journal)?;
    page.activate().await?;
    page.manager.discover();
    page.settle();

    assert_eq!(page.manager.registry().len(), 3);
    assert_eq!(page.defined_ids().len(), 3);
    let displayed: Vec<ServiceCall> = page
        .journal
        .snapshot()
        .into_iter()
        .filter(|call| matches!(call, ServiceCall::Display { .. }))
        .collect();
    assert_eq!(
        displayed,
        vec![
            ServiceCall::Display {
                element_id: "leaderboard".to_owned()
            },
            ServiceCall::Display {
                element_id: "ad-slot-2".to_owned()
            },
        ]
    );
    Ok(())
}

#[tokio::test]
async fn malformed_targeting_registers_without_targeting() -> Result<()> {
    let html = r#"<html><body><div id="a" class="pubad" data-targeting="{oops"></div></body></html>"#;
    let mut page = Page::load(html, 800)?;
    page.activate().await?;
    page.manager.discover();
    page.settle();

    assert_eq!(page.manager.registry().get("a").map(|slot| slot.targeting.clone()), Some(None));
    assert!(
        !page
            .journal
            .snapshot()
            .iter()
            .any(|call| matches!(call, ServiceCall::ApplyTargeting { .. }))
    );
    Ok(())
}

#[tokio::test]
async fn position_can_be_appended_to_unit_path() -> Result<()> {
    let config = ManagerConfig {
        network_identifier: "99".to_owned(),
        base_path: "/news".to_owned(),
        append_position_to_path: true,
        ..ManagerConfig::default()
    };
    let (service, journal) = RecordingService::new();
    let mut page = Page::load_with(PAGE, 800, config, service, journal)?;
    page.activate().await?;
    page.manager.discover();
    page.settle();

    let paths: Vec<String> = page
        .journal
        .snapshot()
        .into_iter()
        .filter_map(|call| match call {
            ServiceCall::DefineSlot { unit_path, .. } => Some(unit_path),
            _ => None,
        })
        .collect();
    assert_eq!(paths, vec!["99/news/top", "99/news/sidebar", "99/news/default"]);
    Ok(())
}

#[tokio::test]
async fn inserted_marker_triggers_rediscovery() -> Result<()> {
    let mut page = Page::load(PAGE, 800)?;
    page.activate().await?;
    page.manager.discover();
    page.manager.watch();
    page.settle();
    assert!(!page.manager.on_dom_batches(), "write-back echoes are not insertions");

    let main = find_tag(&page.document, NodeKey::ROOT, "main").expect("main present");
    let plain = fragment_updates("<p>More story</p>", main, 0, &mut page.keys)?;
    page.document.apply_batch(plain)?;
    assert!(!page.manager.on_dom_batches());

    // Appended after every existing marker, so its positional id is fresh.
    let body = find_tag(&page.document, NodeKey::ROOT, "body").expect("body present");
    let marker = fragment_updates(
        r#"<section><div class="pubad" data-pos="inread"></div></section>"#,
        body,
        3,
        &mut page.keys,
    )?;
    page.document.apply_batch(marker)?;
    assert!(page.manager.on_dom_batches());
    page.settle();

    assert_eq!(
        page.manager.registry().ids(),
        vec!["ad-slot-1", "ad-slot-2", "ad-slot-3", "leaderboard"]
    );
    let inread = page.manager.registry().get("ad-slot-3").expect("new marker");
    assert_eq!(inread.position, "inread");
    assert_eq!(inread.sizes, vec![size(640, 360)]);
    Ok(())
}

#[tokio::test]
async fn removal_does_not_trigger_rediscovery() -> Result<()> {
    let mut page = Page::load(PAGE, 800)?;
    page.activate().await?;
    page.manager.discover();
    page.manager.watch();
    page.settle();
    let defined = page.defined_ids().len();

    let leaderboard = page
        .manager
        .dom_index()
        .element_by_id("leaderboard")
        .expect("leaderboard present");
    page.document
        .apply_batch(vec![DOMUpdate::RemoveNode { node: leaderboard }])?;
    assert!(!page.manager.on_dom_batches());
    page.settle();

    assert_eq!(page.defined_ids().len(), defined);
    assert!(page.manager.registry().get("leaderboard").is_some());
    Ok(())
}

#[tokio::test]
async fn insertion_is_ignored_until_watching() -> Result<()> {
    let mut page = Page::load(PAGE, 800)?;
    page.activate().await?;
    page.manager.discover();
    page.settle();

    let main = find_tag(&page.document, NodeKey::ROOT, "main").expect("main present");
    let marker = fragment_updates(r#"<div class="pubad"></div>"#, main, 0, &mut page.keys)?;
    page.document.apply_batch(marker)?;
    assert!(!page.manager.on_dom_batches());
    assert_eq!(page.manager.registry().len(), 3);
    Ok(())
}

#[tokio::test]
async fn refresh_updates_sizes_and_skips_missing_markers() -> Result<()> {
    let mut page = Page::load(PAGE, 800)?;
    page.activate().await?;
    page.manager.discover();
    page.settle();

    let sidebar = page
        .manager
        .dom_index()
        .element_by_id("ad-slot-1")
        .expect("sidebar present");
    page.document
        .apply_batch(vec![DOMUpdate::RemoveNode { node: sidebar }])?;

    page.manager.on_resize(1200, Instant::now());
    assert_eq!(page.manager.refresh(), 2);
    page.settle();

    let registry = page.manager.registry();
    assert_eq!(
        registry.get("leaderboard").map(|slot| slot.sizes.clone()),
        Some(vec![size(970, 90), size(970, 250)])
    );
    assert_eq!(
        registry.get("ad-slot-1").map(|slot| slot.sizes.clone()),
        Some(Vec::new()),
        "stale entry is left alone"
    );
    assert_eq!(page.refresh_count(), 1);
    Ok(())
}

#[tokio::test]
async fn refresh_before_activation_is_silent() -> Result<()> {
    let mut page = Page::load(PAGE, 800)?;
    assert_eq!(page.manager.refresh(), 0);
    page.settle();
    assert_eq!(page.refresh_count(), 0);
    Ok(())
}

#[tokio::test]
async fn removed_marker_does_not_block_other_id_write_backs() -> Result<()> {
    let mut page = Page::load(PAGE, 800)?;
    page.activate().await?;
    let report = page.manager.discover().expect("manager is active");
    assert_eq!(report.assigned_ids, vec!["ad-slot-1", "ad-slot-2"]);

    // The page drops the sidebar marker before the ids reach the document.
    let markers = page.manager.dom_index().elements_by_class("pubad");
    let (sidebar, article) = (markers[1], markers[2]);
    page.document
        .apply_batch(vec![DOMUpdate::RemoveNode { node: sidebar }])?;
    page.settle();

    assert!(!page.document.contains(sidebar));
    assert_eq!(page.document.attribute(article, "id"), Some("ad-slot-2"));
    page.manager.on_dom_batches();
    assert_eq!(page.manager.dom_index().element_by_id("ad-slot-1"), None);
    assert_eq!(page.manager.dom_index().element_by_id("ad-slot-2"), Some(article));
    Ok(())
}

#[tokio::test]
async fn legacy_position_names_get_their_sizes() -> Result<()> {
    let mut page = Page::load(
        r#"<html><body>
          <div id="masthead" class="pubad" data-pos="topo"></div>
          <div id="rail" class="pubad" data-pos="lateral"></div>
          <div id="base" class="pubad" data-pos="rodape"></div>
        </body></html>"#,
        1200,
    )?;
    page.activate().await?;
    page.manager.discover();
    page.settle();

    let registry = page.manager.registry();
    let masthead = registry.get("masthead").expect("registered");
    assert_eq!(masthead.position, "topo");
    assert_eq!(masthead.sizes, vec![size(970, 90), size(970, 250)]);
    assert_eq!(
        registry.get("rail").map(|slot| slot.sizes.clone()),
        Some(vec![size(300, 250), size(300, 600)])
    );
    assert_eq!(
        registry.get("base").map(|slot| slot.sizes.clone()),
        Some(vec![size(728, 90)])
    );
    Ok(())
}
