use std::time::Duration;

use esign_userop::config::PollPolicy;
use esign_userop::relayer::{HttpRelayer, Relayer};
use esign_userop::signer::{EmailSigner, SIGN_HASH_TEMPLATE_ID};
use esign_userop::UserOpError;
use ethers::types::{Address, H256, U256};
use reqwest::Url;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn auth_msg_json() -> Value {
    json!({
        "templateId": SIGN_HASH_TEMPLATE_ID,
        "commandParams": [format!("{:?}", H256::repeat_byte(0x05))],
        "skippedCommandPrefix": "0",
        "proof": {
            "domainName": "gmail.com",
            "publicKeyHash": format!("{:?}", H256::repeat_byte(0x01)),
            "timestamp": 1735825759u64,
            "maskedCommand": "signHash 1",
            "emailNullifier": format!("{:?}", H256::repeat_byte(0x02)),
            "accountSalt": format!("{:?}", H256::repeat_byte(0x03)),
            "isCodeExist": true,
            "proof": "0xabcdef"
        }
    })
}

fn status_json(status: &str, response: Option<Value>) -> Value {
    json!({
        "message": "ok",
        "request": {
            "id": "req-1",
            "status": status,
            "updatedAt": "2025-01-02T12:00:00Z"
        },
        "response": response,
    })
}

fn signer(relayer: &HttpRelayer) -> EmailSigner<'_, HttpRelayer> {
    EmailSigner::new(relayer, Address::repeat_byte(0xd1), "dev")
        .poll_policy(PollPolicy::fixed(Duration::from_millis(10)))
}

#[tokio::test]
async fn signs_hash_through_relayer() {
    let server = MockServer::start().await;
    let hash = H256::repeat_byte(0x09);

    Mock::given(method("POST"))
        .and(path("/submit"))
        .and(body_partial_json(json!({
            "commandTemplate": "signHash {uint}",
            "commandParams": [U256::from_big_endian(hash.as_bytes()).to_string()],
            "templateId": SIGN_HASH_TEMPLATE_ID,
            "emailAddress": "alice@gmail.com",
            "codeExistsInEmail": true,
            "chain": "dev",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Request submitted",
            "id": "req-1",
            "status": "Request received"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/status/req-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_json("Processing", None)))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/status/req-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(status_json("Finished", Some(auth_msg_json()))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let relayer = HttpRelayer::new(Url::parse(&server.uri()).unwrap());
    let msg = signer(&relayer)
        .sign_hash("0x01", "alice@gmail.com", hash, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(msg.proof.domain_name, "gmail.com");
    assert_eq!(msg.proof.timestamp, U256::from(1_735_825_759u64));
    assert_eq!(format!("{:#x}", msg.template_id), SIGN_HASH_TEMPLATE_ID);
}

#[tokio::test]
async fn status_errors_are_retried_until_finished() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/status/req-1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/status/req-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(status_json("Finished", Some(auth_msg_json()))),
        )
        .mount(&server)
        .await;

    let relayer = HttpRelayer::new(Url::parse(&server.uri()).unwrap());
    let msg = signer(&relayer)
        .poll("req-1", Duration::from_secs(5))
        .await
        .unwrap();
    assert!(msg.proof.is_code_exist);
}

#[tokio::test]
async fn pending_request_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/status/req-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_json("Processing", None)))
        .mount(&server)
        .await;

    let relayer = HttpRelayer::new(Url::parse(&server.uri()).unwrap());
    let err = signer(&relayer)
        .poll("req-1", Duration::from_millis(100))
        .await
        .unwrap_err();

    assert!(matches!(err, UserOpError::Timeout { .. }));
    assert_eq!(err.correlation_id(), Some("req-1"));
}

#[tokio::test]
async fn rejected_submit_is_surfaced() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/submit"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid email address"))
        .mount(&server)
        .await;

    let relayer = HttpRelayer::new(Url::parse(&server.uri()).unwrap());
    let err = signer(&relayer)
        .sign_hash("0x01", "not-an-email", H256::zero(), Duration::from_secs(1))
        .await
        .unwrap_err();

    match err {
        UserOpError::RemoteRejection(message) => assert!(message.contains("invalid email address")),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn fetches_account_salt() {
    let server = MockServer::start().await;
    let salt = H256::repeat_byte(0x77);

    Mock::given(method("POST"))
        .and(path("/accountSalt"))
        .and(body_partial_json(json!({
            "accountCode": "0x01",
            "emailAddress": "alice@gmail.com",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accountCode": "0x01",
            "accountSalt": format!("{salt:?}"),
            "emailAddress": "alice@gmail.com",
        })))
        .mount(&server)
        .await;

    let relayer = HttpRelayer::new(Url::parse(&server.uri()).unwrap());
    let got = relayer.account_salt("0x01", "alice@gmail.com").await.unwrap();
    assert_eq!(got, salt);
}

#[tokio::test]
async fn request_id_stays_inside_status_path() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/status/a%2Fb%3Fc%23d"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(status_json("Finished", Some(auth_msg_json()))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let relayer = HttpRelayer::new(Url::parse(&format!("{}/", server.uri())).unwrap());
    let status = relayer.status("a/b?c#d").await.unwrap();
    assert_eq!(status.request.status, "Finished");
}
