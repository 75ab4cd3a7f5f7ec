//! A stand-in for the liboqs entry points, with per-thread call counters.
//!
//! The toy KEM is not cryptography. It only has the shape of one: fixed
//! lengths, a key pair whose public half is embedded in the secret half, and
//! a shared secret both sides can compute. Each context is tracked in a
//! per-thread live set, so freeing a pointer twice shows up in
//! [`NativeCallCounts::invalid_frees`] instead of corrupting the heap.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::ffi::{CStr, c_char, c_int, c_void};
use std::sync::Arc;

use oqs_native::kem::OqsKemHeader;
use oqs_native::{KemLengths, OqsFunctions, RawOqsFunctions};

/// Name the toy table recognizes as a working KEM.
pub const TOY_KEM: &str = "Toy-KEM";
/// Name of a KEM whose operations always return `OQS_ERROR`.
pub const FAILING_KEM: &str = "Toy-KEM-Failing";
/// Name the toy table recognizes as a signature scheme.
pub const TOY_SIG: &str = "Toy-SIG";

/// Sizes reported by toy KEM contexts.
pub const TOY_KEM_LENGTHS: KemLengths = KemLengths {
    public_key: 32,
    secret_key: 64,
    ciphertext: 32,
    shared_secret: 32,
};

const KEY_LEN: usize = 32;
const OQS_ERROR: c_int = -1;

/// Calls made into the toy table on the current thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NativeCallCounts {
    /// `OQS_KEM_new`.
    pub kem_new: usize,
    /// `OQS_KEM_free` on a live context.
    pub kem_free: usize,
    /// `OQS_SIG_new`.
    pub sig_new: usize,
    /// `OQS_SIG_free` on a live context.
    pub sig_free: usize,
    /// `OQS_KEM_keypair`.
    pub keypair: usize,
    /// `OQS_KEM_encaps`.
    pub encaps: usize,
    /// `OQS_KEM_decaps`.
    pub decaps: usize,
    /// Frees of pointers that were never allocated or already freed.
    pub invalid_frees: usize,
}

const ZERO_COUNTS: NativeCallCounts = NativeCallCounts {
    kem_new: 0,
    kem_free: 0,
    sig_new: 0,
    sig_free: 0,
    keypair: 0,
    encaps: 0,
    decaps: 0,
    invalid_frees: 0,
};

thread_local! {
    static CALLS: Cell<NativeCallCounts> = const { Cell::new(ZERO_COUNTS) };
    static LIVE: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
    static SEED: Cell<u8> = const { Cell::new(1) };
}

/// Counters for the current thread.
pub fn native_calls() -> NativeCallCounts {
    CALLS.with(Cell::get)
}

/// Zero the counters for the current thread.
pub fn reset_native_calls() {
    CALLS.with(|c| c.set(ZERO_COUNTS));
}

fn bump(update: impl FnOnce(&mut NativeCallCounts)) {
    CALLS.with(|c| {
        let mut counts = c.get();
        update(&mut counts);
        c.set(counts);
    });
}

fn next_seed() -> u8 {
    SEED.with(|s| {
        let seed = s.get();
        s.set(seed.wrapping_add(1));
        seed
    })
}

fn track(ptr: *mut c_void) -> *mut c_void {
    LIVE.with(|live| live.borrow_mut().insert(ptr as usize));
    ptr
}

fn untrack(ptr: *mut c_void) -> bool {
    LIVE.with(|live| live.borrow_mut().remove(&(ptr as usize)))
}

fn is_live(ptr: *const c_void) -> bool {
    LIVE.with(|live| live.borrow().contains(&(ptr as usize)))
}

#[repr(C)]
struct ToyKem {
    header: OqsKemHeader,
    failing: bool,
}

const SIG_TAG: u32 = 0x5349_47;

#[repr(C)]
struct ToySig {
    tag: u32,
}

fn toy_header() -> OqsKemHeader {
    OqsKemHeader {
        method_name: c"Toy-KEM".as_ptr(),
        alg_version: c"0".as_ptr(),
        claimed_nist_level: 1,
        ind_cca: true,
        length_public_key: TOY_KEM_LENGTHS.public_key,
        length_secret_key: TOY_KEM_LENGTHS.secret_key,
        length_ciphertext: TOY_KEM_LENGTHS.ciphertext,
        length_shared_secret: TOY_KEM_LENGTHS.shared_secret,
    }
}

/// # Safety
///
/// `name` is null or NUL-terminated.
unsafe fn name_of<'a>(name: *const c_char) -> Option<&'a [u8]> {
    if name.is_null() {
        return None;
    }
    // SAFETY: non-null and NUL-terminated per the caller.
    Some(unsafe { CStr::from_ptr(name) }.to_bytes())
}

unsafe extern "C" fn toy_kem_new(name: *const c_char) -> *mut c_void {
    bump(|c| c.kem_new += 1);
    // SAFETY: liboqs callers pass NUL-terminated names.
    let failing = match unsafe { name_of(name) } {
        Some(b"Toy-KEM") => false,
        Some(b"Toy-KEM-Failing") => true,
        _ => return std::ptr::null_mut(),
    };
    let kem = Box::new(ToyKem {
        header: toy_header(),
        failing,
    });
    track(Box::into_raw(kem).cast())
}

unsafe extern "C" fn toy_kem_free(ctx: *mut c_void) {
    if !untrack(ctx) {
        bump(|c| c.invalid_frees += 1);
        return;
    }
    bump(|c| c.kem_free += 1);
    // SAFETY: `ctx` came from `Box::into_raw` in `toy_kem_new` and was live.
    drop(unsafe { Box::from_raw(ctx.cast::<ToyKem>()) });
}

unsafe extern "C" fn toy_sig_new(name: *const c_char) -> *mut c_void {
    bump(|c| c.sig_new += 1);
    // SAFETY: liboqs callers pass NUL-terminated names.
    match unsafe { name_of(name) } {
        Some(b"Toy-SIG") => track(Box::into_raw(Box::new(ToySig { tag: SIG_TAG })).cast()),
        _ => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn toy_sig_free(ctx: *mut c_void) {
    if !untrack(ctx) {
        bump(|c| c.invalid_frees += 1);
        return;
    }
    // SAFETY: `ctx` came from `Box::into_raw` in `toy_sig_new` and was live.
    let sig = unsafe { Box::from_raw(ctx.cast::<ToySig>()) };
    if sig.tag == SIG_TAG {
        bump(|c| c.sig_free += 1);
    } else {
        bump(|c| c.invalid_frees += 1);
    }
}

/// # Safety
///
/// A live `ctx` points at a `ToyKem`.
unsafe fn kem_is_usable(ctx: *const c_void) -> bool {
    if !is_live(ctx) {
        return false;
    }
    // SAFETY: live contexts in the KEM table are `ToyKem` boxes.
    !unsafe { &*ctx.cast::<ToyKem>() }.failing
}

fn mix(public: &[u8], ciphertext: &[u8], out: &mut [u8]) {
    for ((o, p), c) in out.iter_mut().zip(public).zip(ciphertext) {
        *o = p ^ c ^ 0xA5;
    }
}

unsafe extern "C" fn toy_kem_keypair(ctx: *const c_void, pk: *mut u8, sk: *mut u8) -> c_int {
    bump(|c| c.keypair += 1);
    // SAFETY: `ctx` comes from this table.
    if !unsafe { kem_is_usable(ctx) } {
        return OQS_ERROR;
    }
    let seed = next_seed();
    let mut secret = [0u8; KEY_LEN];
    for (i, b) in secret.iter_mut().enumerate() {
        *b = seed.wrapping_mul(31).wrapping_add(i as u8);
    }
    let public = secret.map(|b| b ^ 0x5A);

    // SAFETY: callers size `pk` to `length_public_key` (32 bytes).
    let pk = unsafe { std::slice::from_raw_parts_mut(pk, KEY_LEN) };
    // SAFETY: callers size `sk` to `length_secret_key` (64 bytes).
    let sk = unsafe { std::slice::from_raw_parts_mut(sk, KEY_LEN * 2) };
    pk.copy_from_slice(&public);
    let (sk_public, sk_secret) = sk.split_at_mut(KEY_LEN);
    sk_public.copy_from_slice(&public);
    sk_secret.copy_from_slice(&secret);
    0
}

unsafe extern "C" fn toy_kem_encaps(
    ctx: *const c_void,
    ct: *mut u8,
    ss: *mut u8,
    pk: *const u8,
) -> c_int {
    bump(|c| c.encaps += 1);
    // SAFETY: `ctx` comes from this table.
    if !unsafe { kem_is_usable(ctx) } {
        return OQS_ERROR;
    }
    // SAFETY: callers size `pk` to `length_public_key`.
    let pk = unsafe { std::slice::from_raw_parts(pk, KEY_LEN) };
    // SAFETY: callers size `ct` to `length_ciphertext`.
    let ct = unsafe { std::slice::from_raw_parts_mut(ct, KEY_LEN) };
    // SAFETY: callers size `ss` to `length_shared_secret`.
    let ss = unsafe { std::slice::from_raw_parts_mut(ss, KEY_LEN) };

    let nonce = next_seed();
    for (i, b) in ct.iter_mut().enumerate() {
        *b = nonce.wrapping_add(i as u8).rotate_left(3);
    }
    mix(pk, ct, ss);
    0
}

unsafe extern "C" fn toy_kem_decaps(
    ctx: *const c_void,
    ss: *mut u8,
    ct: *const u8,
    sk: *const u8,
) -> c_int {
    bump(|c| c.decaps += 1);
    // SAFETY: `ctx` comes from this table.
    if !unsafe { kem_is_usable(ctx) } {
        return OQS_ERROR;
    }
    // SAFETY: callers size `ct` to `length_ciphertext`.
    let ct = unsafe { std::slice::from_raw_parts(ct, KEY_LEN) };
    // SAFETY: callers size `sk` to `length_secret_key`; its first half is the public key.
    let sk = unsafe { std::slice::from_raw_parts(sk, KEY_LEN * 2) };
    // SAFETY: callers size `ss` to `length_shared_secret`.
    let ss = unsafe { std::slice::from_raw_parts_mut(ss, KEY_LEN) };

    let (public, _secret) = sk.split_at(KEY_LEN);
    mix(public, ct, ss);
    0
}

/// The toy function table.
pub fn toy_functions() -> Arc<OqsFunctions> {
    let raw = RawOqsFunctions {
        kem_new: toy_kem_new,
        kem_free: toy_kem_free,
        kem_keypair: toy_kem_keypair,
        kem_encaps: toy_kem_encaps,
        kem_decaps: toy_kem_decaps,
        sig_new: toy_sig_new,
        sig_free: toy_sig_free,
    };
    // SAFETY: each toy function honours the prototype and buffer contract of
    // the liboqs function it replaces, and they are plain functions that live
    // for the whole program.
    Arc::new(unsafe { OqsFunctions::from_raw(raw) })
}
