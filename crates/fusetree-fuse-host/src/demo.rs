//! The sample tree mounted by the host.

use std::sync::Arc;

use fusetree_core::nodes::{BlobFile, DictDir, GeneratorFile, RemoteFile, Symlink};
use fusetree_core::NodeRef;

/// Lines `1\n`, `2\n`, ... up to `limit`, or forever.
fn count(limit: Option<u64>) -> GeneratorFile {
    GeneratorFile::new(move || {
        (1u64..)
            .take_while(move |i| limit.map_or(true, |n| *i <= n))
            .map(|i| format!("{i}\n"))
    })
}

fn plural(n: u64) -> &'static str {
    if n == 1 {
        "bottle"
    } else {
        "bottles"
    }
}

fn verse(i: u64) -> String {
    format!(
        "{i} {} of beer on the wall\n\
         {i} {} of beer\n\
         Take one down, pass it around\n\
         {} {} of beer on the wall\n\n",
        plural(i),
        plural(i),
        i - 1,
        plural(i - 1),
    )
}

fn bottles(n: u64) -> GeneratorFile {
    GeneratorFile::new(move || (1..=n).rev().map(verse))
}

pub fn build_tree() -> NodeRef {
    let root = DictDir::builder()
        .entry("editable", BlobFile::writable("xyz"))
        .entry("editabledir", DictDir::writable())
        .entry("Foo", BlobFile::new("meh"))
        .entry("Bar", BlobFile::new("sldkjfn"))
        .entry("w", GeneratorFile::from_chunks(vec!["1", "2", "3", "4"]))
        .entry("x", DictDir::new())
        .entry("count-100", count(Some(100)))
        .entry("count-forever", count(None))
        .entry("99-bottles", bottles(999))
        .entry("xkcd", RemoteFile::new("https://xkcd.com"))
        .entry("link", Symlink::new("99-bottles"))
        .build();
    Arc::new(root)
}
