//! Ordered route table and template matcher.
//!
//! Every `context` template is compiled once into an anchored regex where a
//! `:name` segment matches exactly one path segment. Routes are tried in
//! declaration order and the first route whose template matches the whole
//! path *and* whose method set contains the request method wins. A winning
//! route flagged `internal` resolves to nothing, exactly as if no route
//! matched.
use std::sync::Arc;

use eyre::{Result, WrapErr};
use http::Method;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::models::RouteDescriptor;

static PARAM_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":(\w+)").expect("static param pattern"));

/// A compiled path template such as `/users/:id`.
#[derive(Debug)]
pub struct ContextTemplate {
    pub template: String,
    pattern: Regex,
    param_names: Vec<String>,
}

impl ContextTemplate {
    pub fn compile(template: &str) -> Result<Self> {
        let mut pattern = String::from("^");
        let mut param_names = Vec::new();
        let mut last = 0;

        for found in PARAM_SEGMENT.find_iter(template) {
            pattern.push_str(&regex::escape(&template[last..found.start()]));
            pattern.push_str("([^/]+)");
            param_names.push(found.as_str()[1..].to_string());
            last = found.end();
        }
        pattern.push_str(&regex::escape(&template[last..]));
        pattern.push('$');

        let pattern = Regex::new(&pattern)
            .wrap_err_with(|| format!("Failed to compile path template '{template}'"))?;

        Ok(Self {
            template: template.to_string(),
            pattern,
            param_names,
        })
    }

    pub fn has_params(&self) -> bool {
        !self.param_names.is_empty()
    }

    /// Match the full path, returning the extracted `(name, value)` pairs.
    pub fn captures(&self, path: &str) -> Option<Vec<(String, String)>> {
        let captures = self.pattern.captures(path)?;
        Some(
            self.param_names
                .iter()
                .enumerate()
                .filter_map(|(i, name)| {
                    captures
                        .get(i + 1)
                        .map(|value| (name.clone(), value.as_str().to_string()))
                })
                .collect(),
        )
    }
}

/// One `pathRewrite` rule: the first match of `pattern` is replaced.
#[derive(Debug)]
pub struct PathRewrite {
    pub pattern: Regex,
    pub replacement: String,
}

/// A route descriptor with its templates, verbs and rewrites pre-compiled.
#[derive(Debug)]
pub struct CompiledRoute {
    pub descriptor: RouteDescriptor,
    pub templates: Vec<ContextTemplate>,
    pub methods: Vec<Method>,
    pub rewrites: Vec<PathRewrite>,
}

impl CompiledRoute {
    pub fn compile(descriptor: &RouteDescriptor) -> Result<Self> {
        let templates = descriptor
            .context
            .iter()
            .map(|template| ContextTemplate::compile(template))
            .collect::<Result<Vec<_>>>()
            .wrap_err_with(|| format!("Invalid context for route '{}'", descriptor.name))?;

        let methods = descriptor
            .methods
            .iter()
            .map(|method| {
                Method::from_bytes(method.to_ascii_uppercase().as_bytes()).wrap_err_with(|| {
                    format!("Invalid method '{method}' on route '{}'", descriptor.name)
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let rewrites = descriptor
            .path_rewrite
            .iter()
            .map(|(pattern, replacement)| {
                Ok(PathRewrite {
                    pattern: Regex::new(pattern).wrap_err_with(|| {
                        format!(
                            "Invalid path_rewrite pattern '{pattern}' on route '{}'",
                            descriptor.name
                        )
                    })?,
                    replacement: replacement.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            descriptor: descriptor.clone(),
            templates,
            methods,
            rewrites,
        })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }
}

/// The outcome of a successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<CompiledRoute>,
    /// Named segment values extracted by the matching template.
    pub params: Vec<(String, String)>,
}

/// Immutable, ordered route table built once at startup.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<CompiledRoute>>,
}

impl RouteTable {
    pub fn new(descriptors: &[RouteDescriptor]) -> Result<Self> {
        let routes = descriptors
            .iter()
            .map(|descriptor| CompiledRoute::compile(descriptor).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { routes })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// First-match-wins resolution. `None` means 404 `route_not_found`.
    pub fn resolve(&self, path: &str, method: &Method) -> Option<RouteMatch> {
        for route in &self.routes {
            if !route.allows(method) {
                continue;
            }
            let params = route
                .templates
                .iter()
                .find_map(|template| template.captures(path));

            if let Some(params) = params {
                if route.descriptor.internal {
                    tracing::debug!(route = route.name(), "Matched internal route, masking as 404");
                    return None;
                }
                return Some(RouteMatch {
                    route: route.clone(),
                    params,
                });
            }
        }
        None
    }
}
