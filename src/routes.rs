//! Declarative passthrough table.
//!
//! Each [`RouteSpec`] binds a public path and verb to an upstream path
//! template. One generic handler serves the whole table: it renders the
//! template from path and query parameters, shapes the body, and hands the
//! request to the [`Forwarder`](crate::forwarder::Forwarder).
//!
//! Guards are attached per path with `route_layer`, so every verb registered
//! on a path shares the same guard and unmatched paths still answer 404.

use axum::Router;
use axum::body::{Bytes, to_bytes};
use axum::extract::{FromRequestParts, Path, Request, State};
use axum::middleware::from_fn_with_state;
use axum::routing::MethodRouter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::instrument;

use crate::auth::guard::enforce;
use crate::auth::{AuthContext, AuthError, Guard, GuardState, TokenAuthority};
use crate::error::GatewayError;
use crate::forwarder::{UpstreamResponse, Verb};
use crate::gateway::Gateway;

/// Largest request body relayed upstream.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Text,
    Integer,
}

/// A required query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryParam {
    pub name: &'static str,
    pub kind: QueryKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyShape {
    /// Nothing is read or sent.
    None,
    /// Any JSON object, relayed untouched.
    Object,
    /// Must deserialize as [`NewArticle`].
    Article,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteSpec {
    pub verb: Verb,
    pub path: &'static str,
    pub guard: Guard,
    /// Upstream path; `{name}` is replaced by a path or query parameter.
    pub upstream: &'static str,
    pub query: &'static [QueryParam],
    pub body: BodyShape,
}

/// Article creation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewArticle {
    pub nombre: String,
    pub descripcion: String,
    pub precio: i64,
    pub categoria: String,
    pub stock: i64,
    pub moneda: String,
}

const fn route(verb: Verb, path: &'static str, guard: Guard, upstream: &'static str) -> RouteSpec {
    RouteSpec {
        verb,
        path,
        guard,
        upstream,
        query: &[],
        body: BodyShape::None,
    }
}

pub static PASSTHROUGH: &[RouteSpec] = &[
    route(Verb::Get, "/articulos", Guard::Global, "/data/articulos"),
    RouteSpec {
        body: BodyShape::Article,
        ..route(Verb::Post, "/articulos", Guard::Global, "/data/articulos")
    },
    route(
        Verb::Get,
        "/articulos/novedades",
        Guard::Global,
        "/data/articulos/novedades",
    ),
    route(
        Verb::Get,
        "/articulos/promociones",
        Guard::Global,
        "/data/articulos/promociones",
    ),
    route(Verb::Get, "/articulos/{id}", Guard::Global, "/data/articulos/{id}"),
    RouteSpec {
        query: &[QueryParam {
            name: "cantidad",
            kind: QueryKind::Integer,
        }],
        ..route(
            Verb::Put,
            "/articulos/venta/{id}",
            Guard::Global,
            "/data/articulos/venta/{id}?cantidad={cantidad}",
        )
    },
    route(Verb::Get, "/sucursales", Guard::Global, "/data/sucursales"),
    route(Verb::Get, "/sucursales/{id}", Guard::Global, "/data/sucursales/{id}"),
    route(
        Verb::Get,
        "/vendedores",
        Guard::GlobalAndVendor,
        "/data/vendedores",
    ),
    RouteSpec {
        query: &[QueryParam {
            name: "sucursal_Id",
            kind: QueryKind::Text,
        }],
        ..route(
            Verb::Get,
            "/vendedores/porSucursal",
            Guard::GlobalAndVendor,
            "/data/vendedores?sucursalId={sucursal_Id}",
        )
    },
    route(
        Verb::Get,
        "/vendedores/{id}",
        Guard::GlobalAndVendor,
        "/data/vendedores/{id}",
    ),
    RouteSpec {
        body: BodyShape::Object,
        ..route(
            Verb::Post,
            "/pedidos/nuevo",
            Guard::Global,
            "/data/pedidos/nuevo",
        )
    },
    RouteSpec {
        body: BodyShape::Object,
        ..route(
            Verb::Post,
            "/contacto/vendedor",
            Guard::Global,
            "/data/contacto/vendedor",
        )
    },
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("Missing query parameter '{0}'")]
    MissingQuery(&'static str),
    #[error("Query parameter '{name}' must be an integer, got '{value}'")]
    InvalidInteger { name: &'static str, value: String },
    #[error("Path parameter '{0}' contains a reserved character")]
    InvalidPathParam(String),
    #[error("No value for upstream placeholder '{0}'")]
    UnresolvedPlaceholder(String),
}

impl From<RouteError> for GatewayError {
    fn from(error: RouteError) -> Self {
        match error {
            RouteError::UnresolvedPlaceholder(_) => GatewayError::Config(error.to_string()),
            _ => GatewayError::InvalidRequest(error.to_string()),
        }
    }
}

impl RouteSpec {
    fn has_path_params(&self) -> bool {
        self.path.contains('{')
    }

    /// Names of the `{name}` placeholders in `template`, in order.
    fn placeholders(template: &str) -> Vec<&str> {
        let mut names = Vec::new();
        let mut rest = template;
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            names.push(&rest[start + 1..start + len]);
            rest = &rest[start + len + 1..];
        }
        names
    }

    /// Upstream path with every placeholder substituted.
    ///
    /// Path values are inserted as-is after rejecting `/`, `?` and `#`; query
    /// values are form-urlencoded, integers are re-rendered from their parsed
    /// value.
    pub fn render(
        &self,
        path_params: &HashMap<String, String>,
        query: &HashMap<String, String>,
    ) -> Result<String, RouteError> {
        let mut values: HashMap<&str, String> = HashMap::new();
        for (name, value) in path_params {
            if value.is_empty() || value.contains(['/', '?', '#']) {
                return Err(RouteError::InvalidPathParam(name.clone()));
            }
            values.insert(name.as_str(), value.clone());
        }
        for param in self.query {
            let raw = query
                .get(param.name)
                .ok_or(RouteError::MissingQuery(param.name))?;
            let rendered = match param.kind {
                QueryKind::Integer => raw
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| RouteError::InvalidInteger {
                        name: param.name,
                        value: raw.clone(),
                    })?
                    .to_string(),
                QueryKind::Text => url::form_urlencoded::byte_serialize(raw.as_bytes()).collect(),
            };
            values.insert(param.name, rendered);
        }

        let mut rendered = self.upstream.to_string();
        for name in Self::placeholders(self.upstream) {
            let value = values
                .get(name)
                .ok_or_else(|| RouteError::UnresolvedPlaceholder(name.to_string()))?;
            rendered = rendered.replace(&format!("{{{name}}}"), value);
        }
        Ok(rendered)
    }

    fn shape_body(&self, bytes: &Bytes) -> Result<Option<Value>, GatewayError> {
        let invalid = |e: serde_json::Error| GatewayError::InvalidRequest(format!("Invalid body: {e}"));
        match self.body {
            BodyShape::None => Ok(None),
            BodyShape::Object => {
                let value: Value = serde_json::from_slice(bytes).map_err(invalid)?;
                if value.is_object() {
                    Ok(Some(value))
                } else {
                    Err(GatewayError::InvalidRequest(
                        "Request body must be a JSON object".to_string(),
                    ))
                }
            }
            BodyShape::Article => {
                let article: NewArticle = serde_json::from_slice(bytes).map_err(invalid)?;
                let value = serde_json::to_value(article).map_err(invalid)?;
                Ok(Some(value))
            }
        }
    }
}

/// Generic passthrough handler for one table entry.
#[instrument(name = "gateway.passthrough", skip_all, fields(verb = %entry.verb, route = entry.path))]
async fn passthrough(
    entry: &'static RouteSpec,
    gateway: Arc<Gateway>,
    request: Request,
) -> Result<UpstreamResponse, GatewayError> {
    let (mut parts, body) = request.into_parts();
    let token = parts
        .extensions
        .get::<AuthContext>()
        .cloned()
        .ok_or(AuthError::InvalidGlobalToken)?;

    let path_params = if entry.has_path_params() {
        Path::<HashMap<String, String>>::from_request_parts(&mut parts, &())
            .await
            .map_err(|e| GatewayError::InvalidRequest(e.body_text()))?
            .0
    } else {
        HashMap::new()
    };
    let query: HashMap<String, String> = parts
        .uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    let upstream_path = entry.render(&path_params, &query)?;

    let payload = match entry.body {
        BodyShape::None => None,
        _ => {
            let bytes = to_bytes(body, MAX_BODY_BYTES)
                .await
                .map_err(|e| GatewayError::InvalidRequest(format!("Unreadable body: {e}")))?;
            entry.shape_body(&bytes)?
        }
    };

    let response = gateway
        .forwarder
        .forward(entry.verb, &upstream_path, payload.as_ref(), token.token())
        .await?;
    Ok(response)
}

/// Router for [`PASSTHROUGH`], one guard layer per path.
pub fn passthrough_routes(authority: Arc<TokenAuthority>) -> Router<Arc<Gateway>> {
    let mut grouped: BTreeMap<&'static str, (Guard, MethodRouter<Arc<Gateway>>)> = BTreeMap::new();
    for entry in PASSTHROUGH {
        let handler = move |State(gateway): State<Arc<Gateway>>, request: Request| {
            passthrough(entry, gateway, request)
        };
        let filter = entry.verb.method_filter();
        let registered = match grouped.remove(entry.path) {
            Some((guard, method_router)) => (guard, method_router.on(filter, handler)),
            None => (entry.guard, axum::routing::on(filter, handler)),
        };
        grouped.insert(entry.path, registered);
    }

    grouped
        .into_iter()
        .fold(Router::new(), |router, (path, (guard, method_router))| {
            let method_router = match guard {
                Guard::None => method_router,
                guard => method_router.route_layer(from_fn_with_state(
                    GuardState::new(authority.clone(), guard),
                    enforce,
                )),
            };
            router.route(path, method_router)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::guard::{GLOBAL_TOKEN_HEADER, VENDOR_TOKEN_HEADER};
    use crate::error::ErrorResponse;
    use crate::gateway::test_support::{self, DENIED, GLOBAL, GRANTED};
    use axum::body::Body;
    use axum::http::{Method, StatusCode};
    use axum::response::Response;
    use serde_json::json;
    use tower::ServiceExt;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry_for(verb: Verb, path: &str) -> &'static RouteSpec {
        PASSTHROUGH
            .iter()
            .find(|entry| entry.verb == verb && entry.path == path)
            .unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    async fn send(router: Router, request: axum::http::Request<Body>) -> (StatusCode, Value) {
        let response: Response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str, headers: &[(&str, &str)]) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::builder().method(Method::GET).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_every_path_has_a_single_guard() {
        let mut guards: HashMap<&str, Guard> = HashMap::new();
        for entry in PASSTHROUGH {
            let guard = *guards.entry(entry.path).or_insert(entry.guard);
            assert_eq!(guard, entry.guard, "conflicting guards on {}", entry.path);
        }
    }

    #[test]
    fn test_every_placeholder_is_resolvable() {
        for entry in PASSTHROUGH {
            for name in RouteSpec::placeholders(entry.upstream) {
                let from_path = entry.path.contains(&format!("{{{name}}}"));
                let from_query = entry.query.iter().any(|q| q.name == name);
                assert!(
                    from_path || from_query,
                    "{} {} has no source for {{{name}}}",
                    entry.verb,
                    entry.path
                );
            }
        }
    }

    #[test]
    fn test_seller_routes_require_vendor_token() {
        for entry in PASSTHROUGH {
            let expected = if entry.path.starts_with("/vendedores") {
                Guard::GlobalAndVendor
            } else {
                Guard::Global
            };
            assert_eq!(entry.guard, expected, "{}", entry.path);
        }
    }

    #[test]
    fn test_render_substitutes_path_and_query() {
        let sale = entry_for(Verb::Put, "/articulos/venta/{id}");
        let rendered = sale
            .render(&params(&[("id", "A-1")]), &params(&[("cantidad", "3")]))
            .unwrap();
        assert_eq!(rendered, "/data/articulos/venta/A-1?cantidad=3");

        let by_branch = entry_for(Verb::Get, "/vendedores/porSucursal");
        let rendered = by_branch
            .render(&HashMap::new(), &params(&[("sucursal_Id", "S 1&x=2")]))
            .unwrap();
        assert_eq!(rendered, "/data/vendedores?sucursalId=S+1%26x%3D2");
    }

    #[test]
    fn test_render_rejects_bad_parameters() {
        let sale = entry_for(Verb::Put, "/articulos/venta/{id}");
        assert_eq!(
            sale.render(&params(&[("id", "A-1")]), &HashMap::new()),
            Err(RouteError::MissingQuery("cantidad"))
        );
        assert!(matches!(
            sale.render(&params(&[("id", "A-1")]), &params(&[("cantidad", "tres")])),
            Err(RouteError::InvalidInteger { name: "cantidad", .. })
        ));
        let article = entry_for(Verb::Get, "/articulos/{id}");
        for bad in ["a/b", "a?b", "a#b"] {
            assert!(matches!(
                article.render(&params(&[("id", bad)]), &HashMap::new()),
                Err(RouteError::InvalidPathParam(_))
            ));
        }
    }

    #[test]
    fn test_article_body_must_match_shape() {
        let create = entry_for(Verb::Post, "/articulos");
        let good = Bytes::from(
            json!({
                "nombre": "Martillo", "descripcion": "Acero", "precio": 5990,
                "categoria": "herramientas", "stock": 10, "moneda": "CLP"
            })
            .to_string(),
        );
        assert!(create.shape_body(&good).unwrap().is_some());
        let missing = Bytes::from(json!({ "nombre": "Martillo" }).to_string());
        assert!(create.shape_body(&missing).is_err());

        let order = entry_for(Verb::Post, "/pedidos/nuevo");
        assert!(order.shape_body(&Bytes::from_static(b"[1,2]")).is_err());
    }

    #[tokio::test]
    async fn test_missing_global_token_is_rejected_without_upstream_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let router = test_support::router(&server.uri(), None);
        let (status, body) = send(router, get("/articulos", &[])).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, json!({ "error": "Invalid token" }));
    }

    #[tokio::test]
    async fn test_seller_route_without_vendor_token_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let router = test_support::router(&server.uri(), None);
        let (status, body) =
            send(router.clone(), get("/vendedores", &[(GLOBAL_TOKEN_HEADER, GLOBAL)])).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let body: ErrorResponse = serde_json::from_value(body).unwrap();
        assert_eq!(body.error, "Vendor access denied");

        // The denied value is not a free pass.
        let (status, _) = send(
            router,
            get(
                "/vendedores/7",
                &[(GLOBAL_TOKEN_HEADER, GLOBAL), (VENDOR_TOKEN_HEADER, DENIED)],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_seller_route_relays_with_both_tokens() {
        let server = MockServer::start().await;
        let sellers = json!([{ "id": 1, "nombre": "Ana" }]);
        Mock::given(method("GET"))
            .and(path("/data/vendedores"))
            .and(query_param("sucursalId", "3"))
            .and(header(GLOBAL_TOKEN_HEADER, GLOBAL))
            .respond_with(ResponseTemplate::new(200).set_body_json(&sellers))
            .expect(1)
            .mount(&server)
            .await;

        let router = test_support::router(&server.uri(), None);
        let (status, body) = send(
            router,
            get(
                "/vendedores/porSucursal?sucursal_Id=3",
                &[(GLOBAL_TOKEN_HEADER, GLOBAL), (VENDOR_TOKEN_HEADER, GRANTED)],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, sellers);
    }

    #[tokio::test]
    async fn test_upstream_error_status_is_relayed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/articulos/zzz"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({ "message": "No existe" })),
            )
            .mount(&server)
            .await;

        let router = test_support::router(&server.uri(), None);
        let (status, body) =
            send(router, get("/articulos/zzz", &[(GLOBAL_TOKEN_HEADER, GLOBAL)])).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "message": "No existe" }));
    }

    #[tokio::test]
    async fn test_static_segment_wins_over_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/articulos/novedades"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["nuevo"])))
            .expect(1)
            .mount(&server)
            .await;

        let router = test_support::router(&server.uri(), None);
        let (status, _) = send(
            router,
            get("/articulos/novedades", &[(GLOBAL_TOKEN_HEADER, GLOBAL)]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_sale_requires_integer_quantity() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/data/articulos/venta/A-1"))
            .and(query_param("cantidad", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "stock": 8 })))
            .expect(1)
            .mount(&server)
            .await;

        let router = test_support::router(&server.uri(), None);
        let put = |uri: &str| {
            axum::http::Request::builder()
                .method(Method::PUT)
                .uri(uri)
                .header(GLOBAL_TOKEN_HEADER, GLOBAL)
                .body(Body::empty())
                .unwrap()
        };
        let (status, body) = send(router.clone(), put("/articulos/venta/A-1?cantidad=2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "stock": 8 }));

        let (status, _) = send(router.clone(), put("/articulos/venta/A-1?cantidad=dos")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(router, put("/articulos/venta/A-1")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_order_body_is_relayed() {
        let server = MockServer::start().await;
        let order = json!({ "cliente": "c-9", "items": [{ "id": "A-1", "cantidad": 1 }] });
        Mock::given(method("POST"))
            .and(path("/data/pedidos/nuevo"))
            .and(body_json(&order))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 12 })))
            .expect(1)
            .mount(&server)
            .await;

        let router = test_support::router(&server.uri(), None);
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/pedidos/nuevo")
            .header(GLOBAL_TOKEN_HEADER, GLOBAL)
            .header("content-type", "application/json")
            .body(Body::from(order.to_string()))
            .unwrap();
        let (status, body) = send(router, request).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({ "id": 12 }));
    }

    #[tokio::test]
    async fn test_article_and_contact_bodies_are_relayed() {
        let server = MockServer::start().await;
        let article = json!({
            "nombre": "Martillo", "descripcion": "Acero forjado", "precio": 5990,
            "categoria": "herramientas", "stock": 10, "moneda": "CLP"
        });
        let contact = json!({ "vendedorId": 4, "mensaje": "Necesito cotizar" });
        Mock::given(method("POST"))
            .and(path("/data/articulos"))
            .and(header(GLOBAL_TOKEN_HEADER, GLOBAL))
            .and(body_json(&article))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "A-9" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/data/contacto/vendedor"))
            .and(body_json(&contact))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let router = test_support::router(&server.uri(), None);
        let post = |uri: &str, body: &Value| {
            axum::http::Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(GLOBAL_TOKEN_HEADER, GLOBAL)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap()
        };

        let (status, body) = send(router.clone(), post("/articulos", &article)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({ "id": "A-9" }));

        let (status, body) = send(router.clone(), post("/contacto/vendedor", &contact)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));

        // Missing fields never reach the inventory API.
        let (status, _) = send(router, post("/articulos", &json!({ "nombre": "Martillo" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_502() {
        let router = test_support::router("http://127.0.0.1:1", None);
        let (status, body) =
            send(router, get("/sucursales", &[(GLOBAL_TOKEN_HEADER, GLOBAL)])).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].is_string());
    }
}
