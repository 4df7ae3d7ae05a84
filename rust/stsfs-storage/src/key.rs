//! Mapping of operation paths onto object keys.

use stsfs_policy::BucketPath;

use crate::StorageError;

/// Object key for `path` under `bucket`.
///
/// A leading `/` is ignored. Paths naming a directory (empty, or ending in
/// `/`) and paths with empty, `.` or `..` segments are rejected.
pub fn object_key(bucket: &BucketPath, path: &str) -> Result<String, StorageError> {
    let relative = path.trim_start_matches('/');
    if relative.is_empty() || relative.ends_with('/') {
        return Err(StorageError::InvalidPath(format!(
            "{path:?} does not name an object"
        )));
    }
    if relative
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StorageError::InvalidPath(format!(
            "{path:?} has empty, . or .. segments"
        )));
    }
    Ok(bucket.key(relative))
}

/// Key prefix listed for the directory `prefix` under `bucket`.
///
/// The prefix is treated as a directory: `alice` lists `alice/...` and not
/// `alice2/...`. An empty prefix lists everything under the bucket path.
pub fn listing_prefix(bucket: &BucketPath, prefix: &str) -> String {
    let relative = prefix.trim_start_matches('/');
    if relative.is_empty() || relative.ends_with('/') {
        bucket.key(relative)
    } else {
        bucket.key(&format!("{relative}/"))
    }
}

/// S3 ARN of the object `key` in `bucket`.
pub fn object_arn(bucket: &BucketPath, key: &str) -> String {
    format!("arn:aws:s3:::{}/{}", bucket.bucket(), key)
}

/// S3 ARN of `bucket` itself.
pub fn bucket_arn(bucket: &BucketPath) -> String {
    format!("arn:aws:s3:::{}", bucket.bucket())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(path: &str) -> BucketPath {
        BucketPath::parse(path).unwrap()
    }

    #[test]
    fn it_maps_paths_onto_keys() {
        assert_eq!(object_key(&bucket("media"), "/alice/a.txt").unwrap(), "alice/a.txt");
        assert_eq!(
            object_key(&bucket("media/eu"), "alice/a.txt").unwrap(),
            "eu/alice/a.txt"
        );
        for path in ["", "/", "alice/", "alice//a", "alice/../bob/a", "./a"] {
            assert!(
                matches!(
                    object_key(&bucket("media"), path),
                    Err(StorageError::InvalidPath(_))
                ),
                "{path:?} accepted"
            );
        }
    }

    #[test]
    fn it_lists_prefixes_as_directories() {
        assert_eq!(listing_prefix(&bucket("media"), "alice"), "alice/");
        assert_eq!(listing_prefix(&bucket("media"), "/alice/"), "alice/");
        assert_eq!(listing_prefix(&bucket("media"), ""), "");
        assert_eq!(listing_prefix(&bucket("media/eu"), ""), "eu/");
        assert_eq!(listing_prefix(&bucket("media/eu"), "alice"), "eu/alice/");
    }

    #[test]
    fn it_names_resources_by_bucket() {
        let bucket = bucket("media/eu");
        assert_eq!(object_arn(&bucket, "eu/alice/a"), "arn:aws:s3:::media/eu/alice/a");
        assert_eq!(bucket_arn(&bucket), "arn:aws:s3:::media");
    }
}
