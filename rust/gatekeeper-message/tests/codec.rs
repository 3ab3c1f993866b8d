use gatekeeper_message::keys::{LIST_OBJECTS_IN_BUCKET, TRANSACTION_ID};
use gatekeeper_message::{
    Document, GatekeeperMessage, ListedObject, MessageBody, SignatureRequest, SignatureType,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn signature_type() -> impl Strategy<Value = SignatureType> {
    prop::sample::select(SignatureType::ALL.to_vec())
}

fn request() -> impl Strategy<Value = SignatureRequest> {
    (
        signature_type(),
        any::<String>(),
        prop::option::of(any::<String>()),
        prop::collection::btree_map(any::<String>(), any::<String>(), 0..4),
        0u8..3,
        any::<String>(),
    )
        .prop_map(|(kind, key, bucket, metadata, decided, outcome)| {
            let mut request = SignatureRequest::new(kind, key).with_object_metadata(metadata);
            request.set_bucket_name(bucket);
            match decided {
                1 => request.sign(outcome).unwrap(),
                2 => request.decline(outcome).unwrap(),
                _ => {}
            }
            request
        })
}

fn listed_object() -> impl Strategy<Value = ListedObject> {
    (
        any::<String>(),
        prop::option::of(any::<u64>()),
        prop::option::of(any::<String>()),
        prop::option::of(any::<String>()),
    )
        .prop_map(|(key, size, last_modified, etag)| ListedObject {
            key,
            size,
            last_modified,
            etag,
        })
}

fn message() -> impl Strategy<Value = GatekeeperMessage> {
    let body = prop_oneof![
        prop::collection::vec(request(), 0..6).prop_map(MessageBody::Signing),
        prop::collection::vec(listed_object(), 0..6).prop_map(MessageBody::Listing),
    ];

    (
        body,
        prop::collection::btree_map(any::<String>(), any::<String>(), 0..4),
        prop::collection::btree_map(any::<String>(), any::<String>(), 0..4),
    )
        .prop_map(|(body, application, properties)| {
            properties.into_iter().fold(
                GatekeeperMessage::from_body(body).with_application_properties(application),
                |message, (name, value)| message.with_message_property(name, value),
            )
        })
}

proptest! {
    #[test]
    fn it_roundtrips_through_text(message in message()) {
        let decoded = GatekeeperMessage::decode(&message.encode()).unwrap();
        prop_assert_eq!(decoded, message);
    }

    #[test]
    fn it_preserves_batch_length_and_order(requests in prop::collection::vec(request(), 0..12)) {
        let message = GatekeeperMessage::signing(requests.clone());
        let decoded = GatekeeperMessage::decode(&message.encode()).unwrap();
        prop_assert_eq!(decoded.signature_requests(), requests.as_slice());
    }
}

#[test]
fn it_roundtrips_a_decided_batch() -> anyhow::Result<()> {
    let mut signed = SignatureRequest::new(SignatureType::Put, "a.txt").with_bucket_name("b");
    signed.sign("https://b.s3.amazonaws.com/a.txt?X-Amz-Signature=abc")?;
    let mut declined = SignatureRequest::new(SignatureType::Put, "b.txt");
    declined.decline("quota exceeded")?;
    let pending = SignatureRequest::new(SignatureType::AclUpdate, "c.txt")
        .with_metadata("acl", "public-read");

    let message = GatekeeperMessage::signing(vec![signed, declined, pending])
        .with_message_property(TRANSACTION_ID, "01J0000000000000000000000");

    let decoded = GatekeeperMessage::decode(&message.encode())?;
    assert_eq!(decoded, message);
    assert_eq!(
        decoded.signature_requests()[1].decline_reason(),
        Some("quota exceeded")
    );
    assert!(decoded.signature_requests()[2].decision().is_pending());
    Ok(())
}

#[test]
fn it_encodes_listing_flag_first() {
    let message = GatekeeperMessage::listing().with_application_property("prefix", "photos/");
    let document = Document::from(&message);

    assert_eq!(
        document.pairs()[0],
        (LIST_OBJECTS_IN_BUCKET.to_string(), "true".to_string())
    );
    assert_eq!(GatekeeperMessage::try_from(document).unwrap(), message);
}

#[test]
fn it_decodes_text_written_by_hand() -> anyhow::Result<()> {
    let text = "app.user=alice&sigreq.0.type=PUT&sigreq.0.key=reports%2F2024.csv\
                &sigreq.0.metadata.content-type=text%2Fcsv";

    let message = GatekeeperMessage::decode(text)?;
    let request = &message.signature_requests()[0];

    assert_eq!(message.application_property("user"), Some("alice"));
    assert_eq!(request.signature_type(), SignatureType::Put);
    assert_eq!(request.object_key(), "reports/2024.csv");
    assert_eq!(
        request.object_metadata().get("content-type").map(String::as_str),
        Some("text/csv")
    );
    Ok(())
}
