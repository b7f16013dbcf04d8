use serde::Serialize;
use std::fmt;

/// Ordered, non-empty set of image tags. The first tag is the primary one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ImageNames(Vec<String>);

impl ImageNames {
    /// `image:profile-build-N` (when a build id is given) followed by `image:profile`.
    pub fn build(image: &str, profile: &str, build_id: Option<&str>) -> Self {
        let mut tags = Vec::with_capacity(2);
        if let Some(id) = build_id.map(str::trim).filter(|id| !id.is_empty()) {
            tags.push(format!("{image}:{profile}-build-{id}"));
        }
        tags.push(format!("{image}:{profile}"));
        Self(tags)
    }

    pub fn primary(&self) -> &str {
        &self.0[0]
    }

    /// Prefix every tag with `registry`, preserving order.
    #[must_use]
    pub fn derive(&self, registry: &str) -> Self {
        Self(self.0.iter().map(|tag| join_registry(registry, tag)).collect())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn join_registry(registry: &str, tag: &str) -> String {
    let registry = registry.trim().trim_end_matches('/');
    if registry.is_empty() {
        tag.to_owned()
    } else {
        format!("{registry}/{}", tag.trim_start_matches('/'))
    }
}

impl fmt::Display for ImageNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}
