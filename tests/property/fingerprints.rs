use feedflow_pull::FeedRequest;
use proptest::prelude::*;

fn build(url: &str, headers: &[(String, String)], tag: Option<&str>) -> FeedRequest {
    let mut builder = FeedRequest::builder(url, "feeds.example.com", 443);
    for (name, value) in headers {
        builder = builder.header(name.clone(), value.clone());
    }
    if let Some(tag) = tag {
        builder = builder.tag(tag);
    }
    builder.build()
}

proptest! {
    #[test]
    fn equal_inputs_always_collide(
        url in "[a-z/]{1,40}",
        headers in prop::collection::vec(("[a-z-]{1,10}", "[a-z0-9]{0,10}"), 0..5),
        tag in prop::option::of("[a-z]{1,10}"),
    ) {
        let a = build(&url, &headers, tag.as_deref());
        let b = build(&url, &headers, tag.as_deref());
        prop_assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn url_changes_change_the_identity(
        url in "[a-z/]{1,40}",
        suffix in "[a-z]{1,5}",
    ) {
        let a = build(&url, &[], None);
        let b = build(&format!("{url}{suffix}"), &[], None);
        prop_assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn tag_presence_changes_the_identity(
        url in "[a-z/]{1,40}",
        tag in "[a-z]{1,10}",
    ) {
        let untagged = build(&url, &[], None);
        let tagged = build(&url, &[], Some(&tag));
        prop_assert_ne!(untagged.fingerprint(), tagged.fingerprint());
    }
}
