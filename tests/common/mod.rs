#![allow(dead_code)]

pub mod keys {
    use jsonwebtoken::{Algorithm, EncodingKey, Header};
    use serde_json::{json, Value};

    pub const ISSUER: &str = "https://clinic.example/";
    pub const AUDIENCE: &str = "doctors-crm";
    /// Frozen "now" for clock-driven tests
    pub const NOW: i64 = 1_700_000_000;

    const RSA_K1: &[u8] = include_bytes!("../fixtures/rsa_k1.pem");
    const RSA_K2: &[u8] = include_bytes!("../fixtures/rsa_k2.pem");
    pub const RSA_K1_PUBLIC_PEM: &[u8] = include_bytes!("../fixtures/rsa_k1.pub.pem");
    const JWK_K1: &str = include_str!("../fixtures/jwk_k1.json");
    const JWK_K2: &str = include_str!("../fixtures/jwk_k2.json");

    /// The two RSA key pairs the fake issuer can publish.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum TestKey {
        K1,
        K2,
    }

    impl TestKey {
        pub fn kid(self) -> &'static str {
            match self {
                TestKey::K1 => "clinic-k1",
                TestKey::K2 => "clinic-k2",
            }
        }

        pub fn jwk(self) -> Value {
            let raw = match self {
                TestKey::K1 => JWK_K1,
                TestKey::K2 => JWK_K2,
            };
            serde_json::from_str(raw).unwrap()
        }

        pub fn encoding_key(self) -> EncodingKey {
            let pem = match self {
                TestKey::K1 => RSA_K1,
                TestKey::K2 => RSA_K2,
            };
            EncodingKey::from_rsa_pem(pem).unwrap()
        }
    }

    /// `{"keys": [...]}` document publishing `keys`.
    pub fn key_set_json(keys: &[TestKey]) -> String {
        let keys: Vec<Value> = keys.iter().map(|k| k.jwk()).collect();
        json!({ "keys": keys }).to_string()
    }

    /// Claims for the configured issuer and audience.
    pub fn claims(permissions: &[&str], exp: i64) -> Value {
        json!({
            "sub": "auth0|doctor-7",
            "iss": ISSUER,
            "aud": [AUDIENCE, "https://clinic.example/userinfo"],
            "iat": exp - 3600,
            "exp": exp,
            "permissions": permissions,
        })
    }

    /// RS256 token signed by `key` with its own `kid`.
    pub fn mint(key: TestKey, claims: &Value) -> String {
        mint_with(Algorithm::RS256, Some(key.kid()), &key.encoding_key(), claims)
    }

    pub fn mint_with(
        alg: Algorithm,
        kid: Option<&str>,
        key: &EncodingKey,
        claims: &Value,
    ) -> String {
        let header = Header {
            alg,
            kid: kid.map(str::to_string),
            ..Header::default()
        };
        jsonwebtoken::encode(&header, claims, key).unwrap()
    }

    pub fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }
}

pub mod sources {
    use super::keys::TestKey;
    use clinic_auth::security::{KeySource, KeySourceError};
    use jsonwebtoken::jwk::JwkSet;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory issuer whose published keys can be rotated mid-test.
    pub struct CountingSource {
        keys: Mutex<Vec<TestKey>>,
        calls: AtomicUsize,
        failing: AtomicBool,
        delay: Duration,
    }

    impl CountingSource {
        pub fn new(keys: &[TestKey]) -> Self {
            Self::with_delay(keys, Duration::ZERO)
        }

        /// Every fetch sleeps for `delay`, widening race windows.
        pub fn with_delay(keys: &[TestKey], delay: Duration) -> Self {
            Self {
                keys: Mutex::new(keys.to_vec()),
                calls: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
                delay,
            }
        }

        pub fn publish(&self, keys: &[TestKey]) {
            *self.keys.lock().unwrap() = keys.to_vec();
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl KeySource for CountingSource {
        fn fetch(&self) -> Result<JwkSet, KeySourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(KeySourceError::Unavailable("issuer is down".to_string()));
            }
            let keys: Vec<_> = self.keys.lock().unwrap().iter().map(|k| k.jwk()).collect();
            Ok(serde_json::from_value(json!({ "keys": keys })).unwrap())
        }

        fn describe(&self) -> String {
            "counting source".to_string()
        }
    }
}

pub mod harness {
    use super::keys::{AUDIENCE, ISSUER, NOW};
    use super::sources::CountingSource;
    use clinic_auth::security::{
        AuthorizationGate, Clock, JwksKeyProvider, KeyResolver, ManualClock, TokenVerifier,
        TrustedAlgorithm,
    };
    use std::sync::Arc;

    /// A gate over an in-memory issuer, with handles on every moving part.
    pub struct Harness {
        pub gate: AuthorizationGate,
        pub provider: Arc<JwksKeyProvider>,
        pub source: Arc<CountingSource>,
        pub clock: Arc<ManualClock>,
    }

    impl Harness {
        pub fn new(source: CountingSource) -> Self {
            Self::with_leeway(source, 0)
        }

        pub fn with_leeway(source: CountingSource, leeway: u64) -> Self {
            let source = Arc::new(source);
            let clock = Arc::new(ManualClock::new(NOW));
            let provider = Arc::new(
                JwksKeyProvider::new(Arc::clone(&source), TrustedAlgorithm::Rs256)
                    .clock(Arc::clone(&clock) as Arc<dyn Clock>),
            );
            let verifier = TokenVerifier::new(
                Arc::clone(&provider) as Arc<dyn KeyResolver>,
                TrustedAlgorithm::Rs256,
            )
            .leeway(leeway)
            .clock(Arc::clone(&clock) as Arc<dyn Clock>);
            Self {
                gate: AuthorizationGate::new(verifier, AUDIENCE, ISSUER),
                provider,
                source,
                clock,
            }
        }
    }
}

pub mod mock_jwks {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tiny_http::{Header, Response, Server, StatusCode};

    /// What the mock endpoint answers with.
    #[derive(Debug, Clone)]
    pub enum Reply {
        Json(String),
        Status(u16),
        /// Body without Content-Length
        Chunked(String),
        /// Answer only after sleeping
        Slow(Duration, String),
    }

    /// Key-set endpoint on 127.0.0.1 backed by tiny_http.
    pub struct MockJwks {
        url: String,
        hits: Arc<AtomicUsize>,
        server: Arc<Server>,
        handle: Option<JoinHandle<()>>,
    }

    impl MockJwks {
        pub fn start(reply: Reply) -> Self {
            Self::start_with(move |_| reply.clone())
        }

        /// `replies(n)` decides the answer to the n-th request (0-based).
        pub fn start_with<F>(replies: F) -> Self
        where
            F: Fn(usize) -> Reply + Send + 'static,
        {
            let server = Arc::new(Server::http("127.0.0.1:0").unwrap());
            let addr = server.server_addr().to_ip().unwrap();
            let url = format!("http://127.0.0.1:{}/.well-known/jwks.json", addr.port());
            let hits = Arc::new(AtomicUsize::new(0));

            let handle = {
                let server = Arc::clone(&server);
                let hits = Arc::clone(&hits);
                thread::spawn(move || {
                    for request in server.incoming_requests() {
                        let n = hits.fetch_add(1, Ordering::SeqCst);
                        let json = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                            .unwrap();
                        let _ = match replies(n) {
                            Reply::Json(body) => {
                                request.respond(Response::from_string(body).with_header(json))
                            }
                            Reply::Status(code) => request
                                .respond(Response::from_string("oops").with_status_code(code)),
                            Reply::Chunked(body) => request.respond(Response::new(
                                StatusCode(200),
                                vec![json],
                                std::io::Cursor::new(body.into_bytes()),
                                None,
                                None,
                            )),
                            Reply::Slow(delay, body) => {
                                thread::sleep(delay);
                                request.respond(Response::from_string(body).with_header(json))
                            }
                        };
                    }
                })
            };

            Self {
                url,
                hits,
                server,
                handle: Some(handle),
            }
        }

        pub fn url(&self) -> &str {
            &self.url
        }

        pub fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    impl Drop for MockJwks {
        fn drop(&mut self) {
            self.server.unblock();
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }
}
