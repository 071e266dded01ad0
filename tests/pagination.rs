#[allow(dead_code)]
mod common;

use checklist_filter::prelude::*;
use common::*;

fn pages(tokens: &[&str]) -> PaginationControl {
    PaginationControl::Pages(tokens.iter().map(|token| PageToken::from(*token)).collect())
}

fn setup(control: PaginationControl, source: Rc<MockPageSource>) -> (FilterController, Rc<MockContainer>) {
    let controller = filter_controller();
    let container = MockContainer::new(control);
    controller.bind_container("city", container.clone());
    controller.set_page_source(source);
    (controller, container)
}

#[tokio::test]
async fn later_pages_are_merged_without_duplicates() {
    let source = MockPageSource::new([
        ("p2", vec![(vec!["Shelbyville", "Springfield"], None)]),
        ("p3", vec![(vec!["Ogdenville"], None)]),
    ]);
    let (controller, container) = setup(pages(&["p2", "p3"]), source.clone());
    let first = entries(&["Springfield"]);
    controller.register_group("city", handles(&first)).unwrap();

    let report = controller.discover_and_merge("city").await.unwrap();
    assert_eq!(
        report,
        SweepReport {
            pages_fetched: 2,
            merged: 2,
            duplicates: 1,
            ..Default::default()
        }
    );
    assert!(report.is_complete());
    assert_eq!(labels(&controller, "city"), ["Springfield", "Shelbyville", "Ogdenville"]);
    assert_eq!(container.rendered_labels(), ["Shelbyville", "Ogdenville"]);

    // loaded pages are never fetched again
    let report = controller.discover_and_merge("city").await.unwrap();
    assert_eq!(report, SweepReport::default());
    assert_eq!(source.fetch_count(), 2);
    assert_eq!(controller.group_len("city"), Some(3));
    controller.with_pagination("city", |data| {
        let data = data.unwrap();
        assert!(data.is_loaded(&PageToken::from("p2")));
        assert!(!data.is_loading());
        assert!(data.discovered().is_empty());
    });
}

#[tokio::test]
async fn page_fetches_are_bounded() {
    let source = MockPageSource::new([
        ("p2", vec![(vec!["a"], None)]),
        ("p3", vec![(vec!["b"], None)]),
        ("p4", vec![(vec!["c"], None)]),
        ("p5", vec![(vec!["d"], None)]),
    ]);
    let (controller, _container) = setup(pages(&["p2", "p3", "p4", "p5"]), source.clone());
    controller.register_group("city", Vec::new()).unwrap();

    let report = controller.discover_and_merge("city").await.unwrap();
    assert_eq!(report.pages_fetched, 4);
    assert!(source.max_in_flight.get() <= 2);
    // merged in page order
    assert_eq!(labels(&controller, "city"), ["a", "b", "c", "d"]);
}

#[tokio::test]
async fn failed_pages_are_retried_on_the_next_sweep() {
    let source = MockPageSource::new([
        ("p2", vec![(vec!["Shelbyville"], None)]),
        ("p3", vec![(vec!["Ogdenville"], None)]),
    ]);
    source.fail_once("p3");
    let (controller, _container) = setup(pages(&["p2", "p3"]), source.clone());
    controller.register_group("city", handles(&entries(&["Springfield"]))).unwrap();

    let report = controller.discover_and_merge("city").await.unwrap();
    assert_eq!((report.pages_fetched, report.pages_failed, report.merged), (1, 1, 1));
    assert!(!report.is_complete());
    controller.with_pagination("city", |data| {
        let data = data.unwrap();
        assert!(!data.is_loaded(&PageToken::from("p3")));
        assert!(!data.is_loading());
    });

    let report = controller.discover_and_merge("city").await.unwrap();
    assert_eq!((report.pages_fetched, report.pages_failed, report.merged), (1, 0, 1));
    assert_eq!(
        *source.fetched.borrow(),
        [PageToken::from("p2"), PageToken::from("p3"), PageToken::from("p3")]
    );
    assert_eq!(labels(&controller, "city"), ["Springfield", "Shelbyville", "Ogdenville"]);
}

#[tokio::test]
async fn next_links_are_followed_once() {
    let source = MockPageSource::new([
        ("p2", vec![(vec!["Shelbyville"], Some("p3"))]),
        ("p3", vec![(vec!["Ogdenville"], Some("p2"))]),
    ]);
    let (controller, _container) = setup(PaginationControl::NextLink(PageToken::from("p2")), source.clone());
    controller.register_group("city", handles(&entries(&["Springfield"]))).unwrap();

    let report = controller.discover_and_merge("city").await.unwrap();
    assert_eq!((report.pages_fetched, report.merged), (2, 2));
    assert_eq!(source.fetch_count(), 2);

    let report = controller.discover_and_merge("city").await.unwrap();
    assert_eq!(report, SweepReport::default());
    assert_eq!(source.fetch_count(), 2);
}

#[tokio::test]
async fn container_is_matched_by_position() {
    let source = MockPageSource::new([(
        "p2",
        vec![(vec!["Oregon"], None), (vec!["Shelbyville"], None)],
    )]);
    let controller = filter_controller();
    controller.set_page_source(source);
    controller.bind_container("city", MockContainer::at(1, pages(&["p2"])));
    controller.register_group("city", handles(&entries(&["Springfield"]))).unwrap();

    controller.discover_and_merge("city").await.unwrap();
    assert_eq!(labels(&controller, "city"), ["Springfield", "Shelbyville"]);
}

#[tokio::test]
async fn concurrent_sweeps_are_skipped() {
    let source = MockPageSource::new([("p2", vec![(vec!["Shelbyville"], None)])]);
    let (controller, _container) = setup(pages(&["p2"]), source.clone());
    controller.register_group("city", handles(&entries(&["Springfield"]))).unwrap();

    let (first, second) = futures::join!(
        controller.discover_and_merge("city"),
        controller.discover_and_merge("city")
    );
    assert_eq!(first.unwrap().merged, 1);
    assert!(second.unwrap().skipped);
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test]
async fn merged_items_are_scored_against_the_active_search() {
    let source = MockPageSource::new([("p2", vec![(vec!["Shelbyville", "Ogdenville"], None)])]);
    let (controller, container) = setup(pages(&["p2"]), source);
    let first = entries(&["Springfield"]);
    controller.register_group("city", handles(&first)).unwrap();

    let outcome = controller.filter("city", "ville").await.unwrap();
    assert_eq!(outcome, FilterOutcome::Applied { visible: 0 });

    controller.discover_and_merge("city").await.unwrap();
    insta::assert_snapshot!(render(&controller, "city"), @r"
    [ ] 0.70 Shelbyville
    [ ] 0.70 Ogdenville
    ");
    assert_eq!(*container.order.borrow(), ["Shelbyville", "Ogdenville", "Springfield"]);
    assert!(!first[0].visible.get());
}

#[tokio::test]
async fn records_wait_for_their_group() {
    let source = MockPageSource::new([("p2", vec![(vec!["Shelbyville", "Springfield"], None)])]);
    let (controller, _container) = setup(pages(&["p2"]), source);

    let report = controller.discover_and_merge("city").await.unwrap();
    assert_eq!((report.pages_fetched, report.merged), (1, 0));
    controller.with_pagination("city", |data| assert_eq!(data.unwrap().discovered().len(), 2));

    let registered = controller
        .register_group("city", handles(&entries(&["Springfield"])))
        .unwrap();
    assert_eq!(registered, 2);
    assert_eq!(labels(&controller, "city"), ["Springfield", "Shelbyville"]);
}

#[tokio::test]
async fn missing_collaborators_are_errors() {
    let controller = filter_controller();
    assert!(matches!(
        controller.discover_and_merge("city").await,
        Err(FilterError::NoPageSource)
    ));

    controller.set_page_source(MockPageSource::new([]));
    assert!(matches!(
        controller.discover_and_merge("city").await,
        Err(FilterError::UnknownContainer(_))
    ));
}
