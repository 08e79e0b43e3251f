//! Tests for resolving symbols inputs into the file that gets uploaded

use appcenter_distribute::paths::PathResolver;
use appcenter_distribute::symbols::prepare_symbols;
use appcenter_distribute::{Error, SymbolType, SymbolsError};
use std::fs::File;
use std::path::Path;

fn entry_names(zip_path: &Path) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(File::open(zip_path).unwrap()).unwrap();
    let mut names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn several_dsym_bundles_share_one_archive() {
    let workspace = tempfile::tempdir().unwrap();
    for bundle in ["App.dSYM", "Widget.dSYM"] {
        let dwarf = workspace
            .path()
            .join("build/ios")
            .join(bundle)
            .join("Contents/Resources/DWARF");
        std::fs::create_dir_all(&dwarf).unwrap();
        std::fs::write(dwarf.join("binary"), bundle).unwrap();
    }
    let out = tempfile::tempdir().unwrap();

    let paths = PathResolver::new(workspace.path())
        .expand_symbols_paths(SymbolType::Apple, "build/**/*.dSYM")
        .unwrap();
    assert_eq!(paths.len(), 2);

    let archive = prepare_symbols(&paths, false, out.path())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(archive, out.path().join("ios.zip"));
    let names = entry_names(&archive);
    assert!(names.contains(&"App.dSYM/Contents/Resources/DWARF/binary".to_string()));
    assert!(names.contains(&"Widget.dSYM/Contents/Resources/DWARF/binary".to_string()));
}

#[tokio::test]
async fn mapping_file_is_uploaded_as_is() {
    let workspace = tempfile::tempdir().unwrap();
    let mapping = workspace.path().join("app/build/outputs/mapping/release/mapping.txt");
    std::fs::create_dir_all(mapping.parent().unwrap()).unwrap();
    std::fs::write(&mapping, "com.example.A -> a:").unwrap();
    let out = tempfile::tempdir().unwrap();

    let paths = PathResolver::new(workspace.path())
        .expand_symbols_paths(SymbolType::AndroidProguard, "**/mapping.txt")
        .unwrap();
    let prepared = prepare_symbols(&paths, false, out.path()).await.unwrap();

    assert_eq!(prepared, Some(mapping));
}

#[tokio::test]
async fn native_libraries_are_always_archived() {
    let workspace = tempfile::tempdir().unwrap();
    let lib = workspace.path().join("obj/local/arm64-v8a/libnative.so");
    std::fs::create_dir_all(lib.parent().unwrap()).unwrap();
    std::fs::write(&lib, "elf").unwrap();
    let out = tempfile::tempdir().unwrap();

    let paths = PathResolver::new(workspace.path())
        .expand_symbols_paths(SymbolType::Breakpad, "obj/local/*/*.so")
        .unwrap();
    let archive = prepare_symbols(&paths, true, out.path())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(archive, out.path().join("arm64-v8a.zip"));
    assert_eq!(entry_names(&archive), vec!["libnative.so"]);
}

#[tokio::test]
async fn missing_symbols_can_be_tolerated() {
    let workspace = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();

    let err = PathResolver::new(workspace.path())
        .expand_symbols_paths(SymbolType::Apple, "**/*.dSYM")
        .unwrap_err();
    assert!(matches!(err, Error::Symbols(SymbolsError::NotFound { .. })));

    let paths = PathResolver::new(workspace.path())
        .continue_on_error(true)
        .expand_symbols_paths(SymbolType::Apple, "**/*.dSYM")
        .unwrap();
    assert!(paths.is_empty());
    assert_eq!(prepare_symbols(&paths, false, out.path()).await.unwrap(), None);
}
