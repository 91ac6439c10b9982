//! Relative URI resolution for fileset manifests.
//!
//! Remote manifests list bare filenames; each must be resolved against the
//! manifest's own URI to produce a fetchable location. This is a direct
//! port of the Python original's hand-rolled resolver rather than a
//! general-purpose URI join, because the original preserves `;attr=value`
//! matrix parameters that `url`-crate-style resolution would drop or
//! reorder, and query strings are always discarded rather than carried
//! forward.

/// Resolve `fn_` against `uri`, the way the remote manifest's own location
/// is resolved against each listed filename.
///
/// - A leading `/` in `fn_` replaces the whole path, keeping only the
///   scheme and host of `uri`.
/// - Otherwise `fn_` replaces the last path segment of `uri`.
/// - Any `;attr=value` matrix parameters on `uri`'s path are carried over
///   onto the result.
/// - A query string on `uri` is discarded.
pub fn relative_uri(uri: &str, fn_: &str) -> String {
  let path = strip_query(uri);
  let (path, attrs) = split_attrs(path);

  let mut new_uri = if let Some(rest) = fn_.strip_prefix('/') {
    let (scheme, host) = split_scheme_host(path);
    format!("{scheme}://{host}/{rest}")
  } else {
    let parent = match path.rfind('/') {
      Some(idx) => &path[..idx],
      None => "",
    };
    format!("{parent}/{fn_}")
  };

  if !attrs.is_empty() {
    new_uri.push(';');
    new_uri.push_str(&attrs.join(";"));
  }

  new_uri
}

fn strip_query(uri: &str) -> &str {
  match uri.find('?') {
    Some(idx) => &uri[..idx],
    None => uri,
  }
}

/// Split off `;attr=value` matrix parameters from a path, returning the
/// bare path and the list of attribute strings in order.
fn split_attrs(path: &str) -> (&str, Vec<&str>) {
  match path.find(';') {
    Some(idx) => {
      let attrs: Vec<&str> = path[idx + 1..].split(';').collect();
      (&path[..idx], attrs)
    }
    None => (path, Vec::new()),
  }
}

/// Split `scheme://host/path` into `(scheme, host)`.
fn split_scheme_host(path: &str) -> (&str, &str) {
  let (scheme, rest) = path.split_once(':').unwrap_or(("", path));
  let rest = rest.trim_start_matches('/');
  let host = match rest.find('/') {
    Some(idx) => &rest[..idx],
    None => rest,
  };
  (scheme, host)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resolves_sibling_path() {
    assert_eq!(relative_uri("http://foo/bar", "baz"), "http://foo/baz");
    assert_eq!(
      relative_uri("http://foo/bar/baz", "abc"),
      "http://foo/bar/abc"
    );
  }

  #[test]
  fn resolves_absolute_path_against_host() {
    assert_eq!(relative_uri("http://foo/bar/baz", "/abc"), "http://foo/abc");
  }

  #[test]
  fn preserves_matrix_attrs() {
    assert_eq!(
      relative_uri("http://foo/bar;a=b", "baz"),
      "http://foo/baz;a=b"
    );
    assert_eq!(
      relative_uri("http://foo/bar;a=b;c=d", "baz"),
      "http://foo/baz;a=b;c=d"
    );
    assert_eq!(
      relative_uri("http://foo/bar/baz;a=b;c=d", "/abc"),
      "http://foo/abc;a=b;c=d"
    );
  }

  #[test]
  fn discards_query_string() {
    assert_eq!(
      relative_uri("http://foo/bar?token=x", "baz"),
      "http://foo/baz"
    );
  }
}
