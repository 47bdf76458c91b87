//! Upstream URL construction.
use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;
use url::form_urlencoded;

use crate::core::{
    chain::{Processor, ProcessorOutcome},
    context::{ContextPatch, InboundRequest, RequestContext},
    route_table::{CompiledRoute, RouteMatch},
};

/// Build the upstream URL for a matched request.
///
/// Rewrite rules run in order, each replacing the first match in the current
/// path. Then, for every template that declares named segments, each `:name`
/// placeholder still present in the path is replaced by the captured value.
/// The query string is re-serialized and appended when non-empty.
pub fn rewrite_url(
    route: &CompiledRoute,
    path: &str,
    params: &[(String, String)],
    query: Option<&str>,
) -> String {
    let mut upstream_path = route.rewrites.iter().fold(path.to_string(), |acc, rule| {
        rule.pattern
            .replace(&acc, rule.replacement.as_str())
            .into_owned()
    });

    for template in route.templates.iter().filter(|t| t.has_params()) {
        for (name, value) in params {
            upstream_path = upstream_path.replacen(&format!(":{name}"), value, 1);
        }
        tracing::trace!(template = %template.template, path = %upstream_path, "Substituted params");
    }

    let query = query
        .map(|raw| {
            form_urlencoded::Serializer::new(String::new())
                .extend_pairs(form_urlencoded::parse(raw.as_bytes()))
                .finish()
        })
        .unwrap_or_default();

    let target = route.descriptor.target.trim_end_matches('/');
    if query.is_empty() {
        format!("{target}{upstream_path}")
    } else {
        format!("{target}{upstream_path}?{query}")
    }
}

pub struct UrlProcessor {
    matched: RouteMatch,
    request: Arc<InboundRequest>,
}

impl UrlProcessor {
    pub fn new(matched: RouteMatch, request: Arc<InboundRequest>) -> Self {
        Self { matched, request }
    }
}

#[async_trait]
impl Processor for UrlProcessor {
    fn name(&self) -> &'static str {
        "url"
    }

    async fn process(&mut self, _ctx: &RequestContext) -> Result<ProcessorOutcome> {
        let url = rewrite_url(
            &self.matched.route,
            &self.request.path,
            &self.matched.params,
            self.request.query.as_deref(),
        );
        tracing::debug!(route = self.matched.route.name(), %url, "Resolved upstream url");

        Ok(ProcessorOutcome::with_context(ContextPatch {
            url: Some(url),
            method: Some(self.request.method.clone()),
            ..ContextPatch::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::*;
    use crate::{config::models::RouteDescriptor, core::route_table::RouteTable};

    fn route(context: &str, target: &str, rewrites: &[(&str, &str)]) -> RouteTable {
        RouteTable::new(&[RouteDescriptor {
            name: "r".to_string(),
            context: vec![context.to_string()],
            methods: vec!["GET".to_string()],
            target: target.to_string(),
            path_rewrite: rewrites
                .iter()
                .map(|(p, r)| (p.to_string(), r.to_string()))
                .collect(),
            ..RouteDescriptor::default()
        }])
        .unwrap()
    }

    fn resolve(table: &RouteTable, path: &str, query: Option<&str>) -> String {
        let matched = table.resolve(path, &Method::GET).unwrap();
        rewrite_url(&matched.route, path, &matched.params, query)
    }

    #[test]
    fn test_prefix_rewrite_keeps_param_segment() {
        let table = route("/foo/:id", "http://svc", &[("^/foo", "/bar")]);
        assert_eq!(resolve(&table, "/foo/42", None), "http://svc/bar/42");
    }

    #[test]
    fn test_rewrite_rules_apply_in_order_first_match_only() {
        let table = route(
            "/a/a/:id",
            "http://svc",
            &[("a", "b"), ("^/b/a", "/c")],
        );
        assert_eq!(resolve(&table, "/a/a/1", None), "http://svc/c/1");
    }

    #[test]
    fn test_placeholder_in_replacement_receives_param() {
        let table = route(
            "/users/:id",
            "http://svc",
            &[("^/users/[^/]+", "/members/:id/profile")],
        );
        assert_eq!(
            resolve(&table, "/users/507f", None),
            "http://svc/members/507f/profile"
        );
    }

    #[test]
    fn test_query_is_reserialized() {
        let table = route("/search", "http://svc", &[]);
        assert_eq!(
            resolve(&table, "/search", Some("q=a b&x=1")),
            "http://svc/search?q=a+b&x=1"
        );
        assert_eq!(resolve(&table, "/search", Some("")), "http://svc/search");
    }

    #[tokio::test]
    async fn test_processor_emits_url_and_method() {
        let table = route(
            "/users/:id",
            "http://user-svc",
            &[("^/users", "/api/v1/users")],
        );
        let matched = table.resolve("/users/507f", &Method::GET).unwrap();
        let mut request = InboundRequest::new(Method::GET, "/users/507f");
        request.query = Some("x=1".to_string());

        let mut processor = UrlProcessor::new(matched, Arc::new(request));
        let outcome = processor.process(&RequestContext::default()).await.unwrap();

        assert!(outcome.response.is_none());
        assert_eq!(
            outcome.context.url.as_deref(),
            Some("http://user-svc/api/v1/users/507f?x=1")
        );
        assert_eq!(outcome.context.method, Some(Method::GET));
    }
}
