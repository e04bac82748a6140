//! Package directives, resolution and the local store
//!
//! Source files declare their packages in comments:
//!
//! ```text
//! // Package: Newtonsoft.Json 13.0.1
//! /* Package: Serilog 2.12.0
//!    Package: Serilog.Sinks.Console 4.1.0 */
//! ```
//!
//! The pipeline is comments, then directives, then one version per name,
//! then (optionally) the transitive closure, then libraries on disk.

pub mod comments;
pub mod extract;
pub mod reference;
pub mod resolve;
pub mod store;
pub mod transitive;

pub use comments::extract_comments;
pub use extract::{CommentDirectiveExtractor, DirectiveExtractor, DEFAULT_DIRECTIVE};
pub use reference::{parse_version, PackageReference, ResolvedPackages};
pub use resolve::{MaxVersionResolver, VersionResolver};
pub use store::{LocalPackageStore, PackageManifest, MANIFEST_FILE};
pub use transitive::{
    exact_requirement, DependencyMetadataSource, DependencyRequirement, TransitiveResolver,
};
