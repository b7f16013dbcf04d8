use crate::limit::ResourceLimit;
use crate::manifest::{Manifest, Profile};
use crate::template::{render, unresolved_lines, RenderContext, TemplateError};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Interpreter directive and strict-mode line prepended to every build script.
pub const BUILD_PREAMBLE: &str = "#!/bin/bash\nset -eux\n";

/// Which rendered artifact a failure or warning belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Build,
    Package,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => f.write_str("build script"),
            Self::Package => f.write_str("package recipe"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to render {artifact} for profile '{profile}': {source}")]
pub struct RenderError {
    pub profile: String,
    pub artifact: ArtifactKind,
    #[source]
    pub source: TemplateError,
}

/// A named profile merged over the manifest's `default` profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveProfile {
    pub name: String,
    pub build: Vec<String>,
    pub package: Vec<String>,
    pub vars: BTreeMap<String, Value>,
    pub cpu: Option<ResourceLimit>,
    pub mem: Option<ResourceLimit>,
}

/// Both rendered artifacts of one profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedArtifacts {
    pub build: String,
    pub package: String,
}

/// A rendered line still holding the unresolved-reference sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedLine {
    pub artifact: ArtifactKind,
    pub line: usize,
    pub text: String,
}

impl Profile {
    /// Merge this profile over `default`.
    ///
    /// `build` and `package` are replaced wholesale when non-empty, `vars`
    /// are merged key-wise with this profile winning, and resource overrides
    /// fall back to the default's.
    pub fn merge(self, default: &Profile) -> EffectiveProfile {
        let build = if self.build.is_empty() {
            default.build.clone()
        } else {
            self.build
        };
        let package = if self.package.is_empty() {
            default.package.clone()
        } else {
            self.package
        };
        let mut vars = default.vars.clone();
        vars.extend(self.vars);

        EffectiveProfile {
            name: self.name,
            build,
            package,
            vars,
            cpu: self.cpu.or(default.cpu),
            mem: self.mem.or(default.mem),
        }
    }
}

impl Manifest {
    /// Resolve `name` against the default profile. An absent profile
    /// resolves to the default under the requested name.
    pub fn resolve(&self, name: &str) -> EffectiveProfile {
        let mut profile = self.lookup(name);
        profile.name = name.to_owned();
        profile.merge(&self.default)
    }
}

impl EffectiveProfile {
    /// Build script source before rendering.
    pub fn build_source(&self) -> String {
        let mut s = String::from(BUILD_PREAMBLE);
        for line in &self.build {
            s.push_str(line);
            s.push('\n');
        }
        s
    }

    /// Package recipe source before rendering.
    pub fn package_source(&self) -> String {
        self.package.join("\n")
    }

    pub fn render_build(&self, env: &BTreeMap<String, String>) -> Result<String, RenderError> {
        self.render_artifact(ArtifactKind::Build, &self.build_source(), env)
    }

    pub fn render_package(&self, env: &BTreeMap<String, String>) -> Result<String, RenderError> {
        self.render_artifact(ArtifactKind::Package, &self.package_source(), env)
    }

    /// Render both artifacts; fails on the first artifact that does not render.
    pub fn render(&self, env: &BTreeMap<String, String>) -> Result<RenderedArtifacts, RenderError> {
        Ok(RenderedArtifacts {
            build: self.render_build(env)?,
            package: self.render_package(env)?,
        })
    }

    fn render_artifact(
        &self,
        artifact: ArtifactKind,
        src: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<String, RenderError> {
        let ctx = RenderContext {
            env,
            vars: &self.vars,
            profile: &self.name,
        };
        render(src, &ctx).map_err(|source| RenderError {
            profile: self.name.clone(),
            artifact,
            source,
        })
    }
}

impl RenderedArtifacts {
    pub fn unresolved(&self) -> Vec<UnresolvedLine> {
        let collect = |artifact, text: &str| {
            unresolved_lines(text)
                .into_iter()
                .map(move |(line, text)| UnresolvedLine {
                    artifact,
                    line,
                    text: text.to_owned(),
                })
                .collect::<Vec<_>>()
        };
        let mut out = collect(ArtifactKind::Build, &self.build);
        out.extend(collect(ArtifactKind::Package, &self.package));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{parse_manifest_str, ManifestFormat};
    use serde_json::json;

    fn profile(build: &[&str], package: &[&str], vars: &[(&str, Value)]) -> Profile {
        Profile {
            name: String::new(),
            build: build.iter().map(|s| (*s).to_owned()).collect(),
            package: package.iter().map(|s| (*s).to_owned()).collect(),
            vars: vars
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect(),
            cpu: None,
            mem: None,
        }
    }

    #[test]
    fn non_empty_lists_replace_default_wholesale() {
        let default = profile(&["a", "b"], &["FROM x"], &[]);
        let merged = profile(&["c"], &["FROM y", "RUN z"], &[]).merge(&default);
        assert_eq!(merged.build, vec!["c"]);
        assert_eq!(merged.package, vec!["FROM y", "RUN z"]);
    }

    #[test]
    fn empty_lists_take_default_verbatim() {
        let default = profile(&["a", "b"], &["FROM x"], &[]);
        let merged = profile(&[], &[], &[]).merge(&default);
        assert_eq!(merged.build, default.build);
        assert_eq!(merged.package, default.package);
    }

    #[test]
    fn vars_merge_key_wise_with_profile_winning() {
        let default = profile(&[], &[], &[("a", json!(1)), ("b", json!(2))]);
        let merged = profile(&[], &[], &[("b", json!(20)), ("c", json!(30))]).merge(&default);
        assert_eq!(merged.vars.len(), 3);
        assert_eq!(merged.vars["a"], json!(1));
        assert_eq!(merged.vars["b"], json!(20));
        assert_eq!(merged.vars["c"], json!(30));
    }

    #[test]
    fn resource_overrides_fall_back_to_default() {
        let mut default = profile(&[], &[], &[]);
        default.cpu = Some(ResourceLimit { min: 100, max: 0 });
        default.mem = Some(ResourceLimit { min: 64, max: 128 });
        let mut named = profile(&[], &[], &[]);
        named.mem = Some(ResourceLimit { min: 256, max: 0 });
        let merged = named.merge(&default);
        assert_eq!(merged.cpu, Some(ResourceLimit { min: 100, max: 0 }));
        assert_eq!(merged.mem, Some(ResourceLimit { min: 256, max: 0 }));
    }

    fn manifest() -> Manifest {
        parse_manifest_str(
            r#"
version: 2
default:
  build:
    - echo building {{ .Profile }}
    - make IMAGE={{ .Vars.image }}
  package:
    - FROM {{ .Vars.base }}
    - "ENV BUILD={{ .Env.BUILD_NUMBER }}"
  vars:
    base: alpine:3.19
    image: app
prod:
  vars:
    base: debian:12
broken:
  package:
    - "FROM {{ .Vars.base | nope }}"
"#,
            ManifestFormat::Yaml,
        )
        .unwrap()
    }

    fn env() -> BTreeMap<String, String> {
        BTreeMap::from([("BUILD_NUMBER".to_owned(), "7".to_owned())])
    }

    #[test]
    fn resolve_sets_requested_name() {
        let m = manifest();
        assert_eq!(m.resolve("prod").name, "prod");
        let absent = m.resolve("qa");
        assert_eq!(absent.name, "qa");
        assert_eq!(absent.build, m.default.build);
    }

    #[test]
    fn renders_build_with_preamble() {
        let rendered = manifest().resolve("prod").render_build(&env()).unwrap();
        assert_eq!(
            rendered,
            "#!/bin/bash\nset -eux\necho building prod\nmake IMAGE=app\n"
        );
    }

    #[test]
    fn renders_package_joined_by_newlines() {
        let rendered = manifest().resolve("prod").render_package(&env()).unwrap();
        assert_eq!(rendered, "FROM debian:12\nENV BUILD=7");
    }

    #[test]
    fn render_error_names_profile_and_artifact() {
        let err = manifest().resolve("broken").render(&env()).unwrap_err();
        assert_eq!(err.profile, "broken");
        assert_eq!(err.artifact, ArtifactKind::Package);
        assert!(matches!(err.source, TemplateError::UndefinedFunction { .. }));
        assert!(err
            .to_string()
            .starts_with("failed to render package recipe for profile 'broken'"));
    }

    #[test]
    fn reports_unresolved_lines_per_artifact() {
        let mut effective = manifest().resolve("prod");
        effective.vars.remove("image");
        let rendered = effective.render(&env()).unwrap();
        let unresolved = rendered.unresolved();
        assert_eq!(
            unresolved,
            vec![UnresolvedLine {
                artifact: ArtifactKind::Build,
                line: 4,
                text: "make IMAGE=<no value>".to_owned(),
            }]
        );
    }
}
