//! Integration tests for strategy-chain resolution and the library cache.

use std::path::PathBuf;
use std::sync::Arc;

use oqs_native::{
    Arch, ArchFallback, LibraryLoadError, LibraryOrigin, LoadOptions, Loader, OqsFunctions,
    OqsNativeError, Os, PathConfiguration, Platform, StrategyKind, SymbolError,
};
use oqs_native_test_helpers::prelude::*;
use tracing_test::traced_test;

const LINUX_X64: Platform = Platform::new(Os::Linux, Some(Arch::X86_64));
const LINUX_ARM64: Platform = Platform::new(Os::Linux, Some(Arch::Aarch64));

struct Harness {
    loader: Loader,
    host: Arc<ScriptedHost>,
    opener: Arc<RecordingOpener>,
}

fn harness(host: ScriptedHost, opener: RecordingOpener) -> Harness {
    let host = Arc::new(host);
    let opener = Arc::new(opener);
    let loader = Loader::with_host(host.clone(), opener.clone());
    Harness {
        loader,
        host,
        opener,
    }
}

fn file_origin(path: &str) -> LibraryOrigin {
    LibraryOrigin::File(PathBuf::from(path))
}

fn detail_for(err: &LibraryLoadError, kind: StrategyKind) -> &str {
    err.attempts
        .iter()
        .find(|a| a.strategy == kind)
        .map(|a| a.detail.as_str())
        .unwrap_or_default()
}

#[test]
fn test_explicit_path_short_circuits_the_chain() -> Result<(), Box<dyn std::error::Error>> {
    let path = "/opt/oqs/liboqs.so";
    let h = harness(
        ScriptedHost::new(LINUX_X64).with_file(path),
        RecordingOpener::new().opens_path(path).opens_name("liboqs.so"),
    );

    let library = h
        .loader
        .load(&LoadOptions::new().with_explicit_path(path))?;

    assert_eq!(library.origin(), &file_origin(path));
    assert_eq!(h.opener.calls(), vec![OpenCall::Path(PathBuf::from(path))]);
    assert_eq!(h.host.probes(), vec![HostProbe::IsFile(PathBuf::from(path))]);
    Ok(())
}

#[test]
fn test_missing_explicit_path_falls_through() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness(
        ScriptedHost::new(LINUX_X64),
        RecordingOpener::new().opens_name("liboqs.so"),
    );

    let library = h
        .loader
        .load(&LoadOptions::new().with_explicit_path("/missing/liboqs.so"))?;

    assert_eq!(
        library.origin(),
        &LibraryOrigin::SystemSearch("liboqs.so".to_string())
    );
    Ok(())
}

#[test]
fn test_configured_arch_slot_beats_generic_slot() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness(
        ScriptedHost::new(LINUX_X64)
            .with_file("/cfg/x64/liboqs.so")
            .with_file("/cfg/liboqs.so"),
        RecordingOpener::new()
            .opens_path("/cfg/x64/liboqs.so")
            .opens_path("/cfg/liboqs.so"),
    );
    h.loader.set_path_configuration(Some(
        PathConfiguration::new()
            .with_linux("/cfg/liboqs.so")
            .with_linux_x86_64("/cfg/x64/liboqs.so"),
    ));

    let library = h.loader.load(&LoadOptions::new())?;

    assert_eq!(library.origin(), &file_origin("/cfg/x64/liboqs.so"));
    Ok(())
}

#[test]
fn test_configured_generic_slot_used_without_arch_slot() -> Result<(), Box<dyn std::error::Error>>
{
    let h = harness(
        ScriptedHost::new(LINUX_ARM64).with_file("/cfg/liboqs.so"),
        RecordingOpener::new().opens_path("/cfg/liboqs.so"),
    );
    h.loader.set_path_configuration(Some(
        PathConfiguration::new()
            .with_linux("/cfg/liboqs.so")
            .with_linux_x86_64("/cfg/x64/liboqs.so"),
    ));

    let library = h.loader.load(&LoadOptions::new())?;

    assert_eq!(library.origin(), &file_origin("/cfg/liboqs.so"));
    Ok(())
}

#[test]
fn test_aarch64_strict_policy_skips_x86_64_slot() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness(
        ScriptedHost::new(LINUX_ARM64).with_file("/cfg/x64/liboqs.so"),
        RecordingOpener::new().opens_path("/cfg/x64/liboqs.so"),
    );
    h.loader.set_path_configuration(Some(
        PathConfiguration::new().with_linux_x86_64("/cfg/x64/liboqs.so"),
    ));

    let result = h.loader.load(&LoadOptions::new());

    let err = result
        .err()
        .ok_or("strict policy must not load the x86_64 library")?;
    assert_eq!(
        detail_for(&err, StrategyKind::ConfiguredPaths),
        "no entry for linux-aarch64"
    );
    assert!(h.opener.calls().iter().all(|c| !matches!(c, OpenCall::Path(_))));
    Ok(())
}

#[test]
fn test_aarch64_nearest_sibling_policy_uses_x86_64_slot() -> Result<(), Box<dyn std::error::Error>>
{
    let h = harness(
        ScriptedHost::new(LINUX_ARM64).with_file("/cfg/x64/liboqs.so"),
        RecordingOpener::new().opens_path("/cfg/x64/liboqs.so"),
    );
    h.loader.set_path_configuration(Some(
        PathConfiguration::new()
            .with_linux_x86_64("/cfg/x64/liboqs.so")
            .with_arch_fallback(ArchFallback::NearestSibling),
    ));

    let library = h.loader.load(&LoadOptions::new())?;

    assert_eq!(library.origin(), &file_origin("/cfg/x64/liboqs.so"));
    Ok(())
}

#[test]
fn test_cache_hit_returns_same_instance_without_probing() -> Result<(), Box<dyn std::error::Error>>
{
    let h = harness(
        ScriptedHost::new(LINUX_X64),
        RecordingOpener::new().opens_name("liboqs.so"),
    );

    let first = h.loader.load(&LoadOptions::new())?;
    let opens_after_first = h.opener.calls().len();
    h.host.clear_probes();

    let second = h.loader.load(&LoadOptions::new())?;

    assert!(first.same_instance(&second));
    assert!(h.loader.is_cached());
    assert_eq!(h.opener.calls().len(), opens_after_first);
    assert!(h.host.probes().is_empty());
    Ok(())
}

#[test]
fn test_clear_cache_reruns_the_chain() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness(
        ScriptedHost::new(LINUX_X64),
        RecordingOpener::new().opens_name("liboqs.so"),
    );

    let first = h.loader.load(&LoadOptions::new())?;
    h.loader.clear_cache();
    assert!(!h.loader.is_cached());
    h.opener.clear_calls();

    let second = h.loader.load(&LoadOptions::new())?;

    assert!(!first.same_instance(&second));
    assert_eq!(
        h.opener.calls(),
        vec![OpenCall::ByName("liboqs.so".to_string())]
    );
    Ok(())
}

#[test]
fn test_bypassing_cache_neither_reads_nor_writes_it() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness(
        ScriptedHost::new(LINUX_X64),
        RecordingOpener::new().opens_name("liboqs.so"),
    );
    let uncached = LoadOptions::new().with_cache(false);

    let first = h.loader.load(&uncached)?;
    assert!(!h.loader.is_cached());

    let cached = h.loader.load(&LoadOptions::new())?;
    let again = h.loader.load(&uncached)?;

    assert!(!first.same_instance(&cached));
    assert!(!again.same_instance(&cached));
    Ok(())
}

#[test]
fn test_setting_configuration_invalidates_cache() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness(
        ScriptedHost::new(LINUX_X64).with_file("/cfg/liboqs.so"),
        RecordingOpener::new()
            .opens_name("liboqs.so")
            .opens_path("/cfg/liboqs.so"),
    );

    let before = h.loader.load(&LoadOptions::new())?;
    assert_eq!(
        before.origin(),
        &LibraryOrigin::SystemSearch("liboqs.so".to_string())
    );

    h.loader
        .set_path_configuration(Some(PathConfiguration::new().with_linux("/cfg/liboqs.so")));
    assert!(!h.loader.is_cached());

    let after = h.loader.load(&LoadOptions::new())?;
    assert_eq!(after.origin(), &file_origin("/cfg/liboqs.so"));
    Ok(())
}

#[test]
fn test_configuration_change_during_load_is_not_cached() -> Result<(), Box<dyn std::error::Error>>
{
    let host = Arc::new(ScriptedHost::new(LINUX_X64).with_file("/cfg/liboqs.so"));
    let opener = Arc::new(GatedOpener::new(
        RecordingOpener::new()
            .opens_name("liboqs.so")
            .opens_path("/cfg/liboqs.so"),
    ));
    let loader = Loader::with_host(host, opener.clone());

    let joined = std::thread::scope(|s| {
        let worker = s.spawn(|| loader.load(&LoadOptions::new()));
        opener.wait_until_entered();
        loader.set_path_configuration(Some(PathConfiguration::new().with_linux("/cfg/liboqs.so")));
        opener.release();
        worker.join()
    });
    let in_flight = must(joined.map_err(|_panic| "loading thread panicked"))?;

    assert_eq!(
        in_flight.origin(),
        &LibraryOrigin::SystemSearch("liboqs.so".to_string())
    );
    assert!(!loader.is_cached());

    let fresh = loader.load(&LoadOptions::new())?;
    assert_eq!(fresh.origin(), &file_origin("/cfg/liboqs.so"));
    assert!(loader.is_cached());
    assert_eq!(
        opener.calls().last(),
        Some(&OpenCall::Path(PathBuf::from("/cfg/liboqs.so")))
    );
    Ok(())
}

#[test]
#[traced_test]
fn test_legacy_path_loads_with_deprecation_warning() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness(
        ScriptedHost::new(LINUX_X64).with_file("/legacy/liboqs.so"),
        RecordingOpener::new().opens_path("/legacy/liboqs.so"),
    );
    h.loader
        .set_legacy_path(Some(PathBuf::from("/legacy/liboqs.so")));

    let library = h.loader.load(&LoadOptions::new())?;

    assert_eq!(library.origin(), &file_origin("/legacy/liboqs.so"));
    assert!(logs_contain("deprecated legacy library path"));
    assert!(logs_contain("native library loaded"));
    Ok(())
}

#[test]
fn test_environment_variable_path() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness(
        ScriptedHost::new(LINUX_X64)
            .with_var("LIBOQS_PATH", "/env/liboqs.so")
            .with_file("/env/liboqs.so"),
        RecordingOpener::new().opens_path("/env/liboqs.so"),
    );

    let library = h.loader.load(&LoadOptions::new())?;

    assert_eq!(library.origin(), &file_origin("/env/liboqs.so"));
    Ok(())
}

#[test]
fn test_custom_environment_variable_name() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness(
        ScriptedHost::new(LINUX_X64)
            .with_var("LIBOQS_PATH", "/wrong/liboqs.so")
            .with_var("APP_OQS", "/right/liboqs.so")
            .with_file("/wrong/liboqs.so")
            .with_file("/right/liboqs.so"),
        RecordingOpener::new()
            .opens_path("/wrong/liboqs.so")
            .opens_path("/right/liboqs.so"),
    );

    let library = h
        .loader
        .load(&LoadOptions::new().with_env_var("APP_OQS"))?;

    assert_eq!(library.origin(), &file_origin("/right/liboqs.so"));
    Ok(())
}

#[test]
fn test_environment_variable_diagnostics() -> Result<(), Box<dyn std::error::Error>> {
    let empty = harness(
        ScriptedHost::new(LINUX_X64).with_var("LIBOQS_PATH", "  "),
        RecordingOpener::new(),
    );
    let missing = harness(
        ScriptedHost::new(LINUX_X64).with_var("LIBOQS_PATH", "/nope/liboqs.so"),
        RecordingOpener::new(),
    );

    let empty_err = empty
        .loader
        .load(&LoadOptions::new())
        .err()
        .ok_or("nothing is loadable")?;
    let missing_err = missing
        .loader
        .load(&LoadOptions::new())
        .err()
        .ok_or("nothing is loadable")?;

    assert_eq!(
        detail_for(&empty_err, StrategyKind::EnvironmentVariable),
        "LIBOQS_PATH is empty"
    );
    assert_eq!(
        detail_for(&missing_err, StrategyKind::EnvironmentVariable),
        "LIBOQS_PATH=/nope/liboqs.so: no such file"
    );
    Ok(())
}

#[test]
fn test_extracted_release_root_layout() -> Result<(), Box<dyn std::error::Error>> {
    let path = "/rel/lib/aarch64/liboqs.so";
    let h = harness(
        ScriptedHost::new(LINUX_ARM64).with_file(path),
        RecordingOpener::new().opens_path(path),
    );

    let library = h
        .loader
        .load(&LoadOptions::new().with_extracted_root("/rel"))?;

    assert_eq!(library.origin(), &file_origin(path));
    Ok(())
}

#[test]
fn test_package_relative_search_stops_at_first_hit() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness(
        ScriptedHost::new(LINUX_X64)
            .with_file("/app/lib/native/liboqs.so")
            .with_file("/app/blobs/liboqs.so"),
        RecordingOpener::new()
            .opens_path("/app/lib/native/liboqs.so")
            .opens_path("/app/blobs/liboqs.so"),
    );

    let library = h.loader.load(&LoadOptions::new())?;

    assert_eq!(library.origin(), &file_origin("/app/lib/native/liboqs.so"));
    assert_eq!(
        h.host.probed_files(),
        vec![
            PathBuf::from("/app/bin/liboqs.so"),
            PathBuf::from("/app/lib/liboqs.so"),
            PathBuf::from("/app/lib/native/liboqs.so"),
        ]
    );
    Ok(())
}

#[test]
fn test_android_package_search_reaches_jni_libs() -> Result<(), Box<dyn std::error::Error>> {
    let path = "/app/jniLibs/armeabi-v7a/liboqs.so";
    let h = harness(
        ScriptedHost::new(Platform::new(Os::Android, Some(Arch::Armv7))).with_file(path),
        RecordingOpener::new().opens_path(path),
    );

    let library = h.loader.load(&LoadOptions::new())?;

    assert_eq!(library.origin(), &file_origin(path));
    Ok(())
}

#[test]
fn test_windows_bare_lookup_uses_dll_name() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness(
        ScriptedHost::new(Platform::new(Os::Windows, Some(Arch::X86_64))),
        RecordingOpener::new().opens_name("oqs.dll"),
    );

    let library = h.loader.load(&LoadOptions::new())?;

    assert_eq!(
        library.origin(),
        &LibraryOrigin::SystemSearch("oqs.dll".to_string())
    );
    Ok(())
}

#[test]
fn test_legacy_default_layout_is_last_resort() -> Result<(), Box<dyn std::error::Error>> {
    let path = "/app/native/macos-aarch64/liboqs.dylib";
    let h = harness(
        ScriptedHost::new(Platform::new(Os::MacOs, Some(Arch::Aarch64))).with_file(path),
        RecordingOpener::new().opens_path(path),
    );

    let library = h.loader.load(&LoadOptions::new())?;

    assert_eq!(library.origin(), &file_origin(path));
    assert_eq!(
        h.opener.calls().last(),
        Some(&OpenCall::Path(PathBuf::from(path)))
    );
    Ok(())
}

#[test]
fn test_rejected_image_reports_loader_reason() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness(
        ScriptedHost::new(LINUX_X64).with_file("/bad/liboqs.so"),
        RecordingOpener::new().rejects_path("/bad/liboqs.so"),
    );

    let err = h
        .loader
        .load(&LoadOptions::new().with_explicit_path("/bad/liboqs.so"))
        .err()
        .ok_or("the only candidate is rejected")?;

    assert_eq!(
        detail_for(&err, StrategyKind::ExplicitPath),
        "/bad/liboqs.so: invalid ELF header"
    );
    Ok(())
}

#[test]
fn test_ios_substitutes_process_image() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness(
        ScriptedHost::new(Platform::new(Os::Ios, Some(Arch::Aarch64))),
        RecordingOpener::new(),
    );

    let library = h
        .loader
        .load(&LoadOptions::new().with_explicit_path("/ignored/liboqs.dylib"))?;

    assert_eq!(library.origin(), &LibraryOrigin::CurrentProcess);
    assert_eq!(h.opener.calls(), vec![OpenCall::CurrentProcess]);
    assert!(h.host.probed_files().is_empty());
    Ok(())
}

#[test]
fn test_ios_without_inputs_still_loads_process_image() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness(
        ScriptedHost::new(Platform::new(Os::Ios, Some(Arch::Aarch64))),
        RecordingOpener::new(),
    );

    let library = h.loader.load(&LoadOptions::new())?;

    assert_eq!(library.origin(), &LibraryOrigin::CurrentProcess);
    assert!(h.host.probed_files().is_empty());
    Ok(())
}

#[test]
fn test_missing_working_directory_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness(
        ScriptedHost::new(LINUX_X64).with_cwd(None),
        RecordingOpener::new(),
    );

    let err = h
        .loader
        .load(&LoadOptions::new())
        .err()
        .ok_or("nothing is loadable")?;

    assert_eq!(
        detail_for(&err, StrategyKind::PackageRelativeSearch),
        "working directory unavailable"
    );
    assert_eq!(
        detail_for(&err, StrategyKind::LegacyDefaultLayout),
        "working directory unavailable"
    );
    Ok(())
}

#[test]
#[traced_test]
fn test_total_failure_lists_all_strategies_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness(ScriptedHost::new(LINUX_X64), RecordingOpener::new());

    let err = h
        .loader
        .load(&LoadOptions::new())
        .err()
        .ok_or("nothing is loadable")?;

    assert_eq!(err.strategies().collect::<Vec<_>>(), StrategyKind::ALL.to_vec());
    assert!(!h.loader.is_cached());
    assert!(logs_contain("no load strategy produced the native library"));
    insta::assert_snapshot!(err.to_string(), @r"
unable to load native liboqs library; tried:
  1. explicit path: not supplied
  2. configured paths: no configuration registered
  3. legacy explicit path: not supplied
  4. environment variable: LIBOQS_PATH is not set
  5. extracted release root: not supplied
  6. package-relative search: /app/bin/liboqs.so: no such file; /app/lib/liboqs.so: no such file; /app/lib/native/liboqs.so: no such file; /app/native/liboqs.so: no such file; /app/blobs/liboqs.so: no such file
  7. bare system lookup: liboqs.so: cannot open shared object file: No such file or directory
  8. legacy default layout: /app/native/linux-x86_64/liboqs.so: no such file
");
    Ok(())
}

#[test]
fn test_empty_release_root_is_reported_in_failure() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness(ScriptedHost::new(LINUX_X64), RecordingOpener::new());

    let err = h
        .loader
        .load(&LoadOptions::new().with_extracted_root("/rel"))
        .err()
        .ok_or("nothing is loadable")?;

    assert_eq!(err.attempts.len(), 8);
    insta::assert_snapshot!(err.to_string(), @r"
unable to load native liboqs library; tried:
  1. explicit path: not supplied
  2. configured paths: no configuration registered
  3. legacy explicit path: not supplied
  4. environment variable: LIBOQS_PATH is not set
  5. extracted release root: /rel/lib/x86_64/liboqs.so: no such file
  6. package-relative search: /app/bin/liboqs.so: no such file; /app/lib/liboqs.so: no such file; /app/lib/native/liboqs.so: no such file; /app/native/liboqs.so: no such file; /app/blobs/liboqs.so: no such file
  7. bare system lookup: liboqs.so: cannot open shared object file: No such file or directory
  8. legacy default layout: /app/native/linux-x86_64/liboqs.so: no such file
");
    Ok(())
}

#[test]
fn test_release_root_without_layout_entry_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness(
        ScriptedHost::new(Platform::new(Os::Linux, Some(Arch::X86))),
        RecordingOpener::new(),
    );

    let err = h
        .loader
        .load(&LoadOptions::new().with_extracted_root("/rel"))
        .err()
        .ok_or("nothing is loadable")?;

    assert_eq!(
        detail_for(&err, StrategyKind::ExtractedReleaseRoot),
        "/rel: release layout has no entry for linux-x86"
    );
    assert!(h.host.probed_files().iter().all(|p| !p.starts_with("/rel")));
    Ok(())
}

#[test]
fn test_load_error_converts_into_crate_error() {
    let h = harness(ScriptedHost::new(LINUX_X64), RecordingOpener::new());

    let result = OqsFunctions::load_with(&h.loader, &LoadOptions::new());

    assert!(matches!(result, Err(OqsNativeError::Load(ref e)) if e.attempts.len() == 8));
}

#[test]
fn test_binding_a_library_without_liboqs_symbols_fails() {
    let h = harness(
        ScriptedHost::new(LINUX_X64),
        RecordingOpener::new().opens_name("liboqs.so"),
    );

    let result = OqsFunctions::load_with(&h.loader, &LoadOptions::new());

    assert!(matches!(
        result,
        Err(OqsNativeError::Symbol(SymbolError::Missing {
            symbol: "OQS_KEM_new",
            ..
        }))
    ));
}
