// (C) Copyright 2024-2025 Minbase Developers

/// Docker Hub registry domains that all address the same namespace.
const DOCKERHUB_DOMAINS: [&str; 3] = [
  "registry-1.docker.io/",
  "docker.io/",
  "index.docker.io/"
];

/// Returns the last path segment of an image name.
pub(crate) fn basename(image: &str) -> &str {
  image.rsplit('/').next().unwrap_or(image)
}

/// Splits an image reference into its name and optional tag.
///
/// The tag is the text after the last `:`, provided that text contains no
/// `/` — a colon inside a registry host:port prefix is not a tag.
pub(crate) fn split_tag(image_ref: &str) -> (&str, Option<&str>) {
  match image_ref.rfind(':') {
    Some(pos) if !image_ref[pos + 1..].contains('/') => {
      (&image_ref[..pos], Some(&image_ref[pos + 1..]))
    },
    _ => (image_ref, None)
  }
}

/// Generates the Docker Hub registry variants under which a short image
/// name is commonly addressable.
///
/// `node` expands to `docker.io/node`, `docker.io/library/node`,
/// `registry-1.docker.io/library/node`, `index.docker.io/node` and
/// `index.docker.io/library/node`; a two-segment `org/name` expands to
/// the same domains without the `library/` infix. Names that already
/// carry a registry domain are returned unchanged.
pub(crate) fn dockerhub_variants(base: &str) -> Vec<String> {
  let mut variants = vec![base.to_string()];

  if base.contains('/') && base.contains('.') {
    // already fully qualified
    return variants;
  }

  let parts: Vec<&str> = base.split('/').collect();
  match parts.as_slice() {
    [name] => {
      variants.push(format!("docker.io/{}", name));
      variants.push(format!("docker.io/library/{}", name));
      variants.push(format!("registry-1.docker.io/library/{}", name));
      variants.push(format!("index.docker.io/{}", name));
      variants.push(format!("index.docker.io/library/{}", name));
    },
    [org, name] => {
      variants.push(format!("docker.io/{}/{}", org, name));
      variants.push(format!("registry-1.docker.io/{}/{}", org, name));
      variants.push(format!("index.docker.io/{}/{}", org, name));
    },
    _ => ()
  }

  variants
}

/// Strips a recognized Docker Hub registry domain from an image
/// reference, if present.
pub(crate) fn normalize_image_name(image_ref: &str) -> &str {
  let image_ref = image_ref.trim_end_matches('/');

  for domain in &DOCKERHUB_DOMAINS {
    if image_ref.starts_with(domain) {
      return &image_ref[domain.len()..];
    }
  }

  image_ref
}
