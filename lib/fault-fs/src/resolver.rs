//! Lookup of the genuine libc entry points that the preload library shadows.
//!
//! Every call into a genuine operation goes through a [`RealSymbol`]
//! handle, never through ordinary name-based linkage, so a hook calling the
//! operation it shadows does not land back in itself.

use libc::c_void;
use std::ffi::CStr;
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, Ordering};

/// Finds the address of a symbol by name.
pub trait SymbolLookup {
    fn lookup(&self, name: &CStr) -> *mut c_void;
}

/// Looks a symbol up in the objects loaded after this one, i.e.
/// `dlsym(RTLD_NEXT, name)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NextObject;

impl SymbolLookup for NextObject {
    fn lookup(&self, name: &CStr) -> *mut c_void {
        unsafe { libc::dlsym(libc::RTLD_NEXT, name.as_ptr()) }
    }
}

/// A lazily resolved, process-lifetime symbol address.
///
/// Concurrent first use is fine: every racing thread resolves the same
/// address and stores it, so the slot only ever goes from null to that
/// address. A failed lookup is not stored and is retried on the next call.
#[derive(Debug)]
pub struct RealSymbol {
    name: &'static CStr,
    address: AtomicPtr<c_void>,
}

impl RealSymbol {
    pub const fn new(name: &'static CStr) -> Self {
        Self {
            name,
            address: AtomicPtr::new(ptr::null_mut()),
        }
    }

    pub fn name(&self) -> &'static CStr {
        self.name
    }

    pub fn resolve(&self) -> Option<NonNull<c_void>> {
        self.resolve_with(&NextObject)
    }

    pub fn resolve_with(&self, lookup: &dyn SymbolLookup) -> Option<NonNull<c_void>> {
        if let Some(address) = NonNull::new(self.address.load(Ordering::Acquire)) {
            return Some(address);
        }

        match NonNull::new(lookup.lookup(self.name)) {
            Some(address) => {
                self.address.store(address.as_ptr(), Ordering::Release);
                Some(address)
            }
            None => {
                tracing::error!(
                    symbol = %self.name.to_string_lossy(),
                    "unable to locate the genuine implementation"
                );
                None
            }
        }
    }
}

/// Converts a nul-terminated string literal into a `&'static CStr` at
/// compile time.
pub const fn symbol_name(name: &'static str) -> &'static CStr {
    match CStr::from_bytes_with_nul(name.as_bytes()) {
        Ok(name) => name,
        Err(_) => panic!("symbol names must be nul-terminated"),
    }
}

/// A [`RealSymbol`] that knows the function pointer type it resolves to.
#[derive(Debug)]
pub struct TypedSymbol<F> {
    raw: RealSymbol,
    _signature: PhantomData<F>,
}

impl<F: Copy> TypedSymbol<F> {
    /// # Safety
    ///
    /// `F` must be an `unsafe extern "C" fn` type matching the C prototype
    /// of the symbol called `name`.
    pub const unsafe fn new(name: &'static CStr) -> Self {
        Self {
            raw: RealSymbol::new(name),
            _signature: PhantomData,
        }
    }

    pub fn name(&self) -> &'static CStr {
        self.raw.name()
    }

    pub fn get(&self) -> Option<F> {
        self.get_with(&NextObject)
    }

    pub fn get_with(&self, lookup: &dyn SymbolLookup) -> Option<F> {
        const { assert!(mem::size_of::<F>() == mem::size_of::<*mut c_void>()) };
        let address = self.raw.resolve_with(lookup)?.as_ptr();
        // SAFETY: the constructor's contract guarantees `F` is a function
        // pointer type of the same size as a data pointer.
        Some(unsafe { mem::transmute_copy::<*mut c_void, F>(&address) })
    }
}

/// Declares a static handle to the genuine implementation of a libc
/// function.
///
/// ```ignore
/// real_fn!(static REAL: unsafe extern "C" fn(*const c_char) -> c_int = unlink);
/// ```
#[macro_export]
macro_rules! real_fn {
    ($vis:vis static $name:ident: $ty:ty = $symbol:ident) => {
        $vis static $name: $crate::resolver::TypedSymbol<$ty> = unsafe {
            $crate::resolver::TypedSymbol::new($crate::resolver::symbol_name(concat!(
                stringify!($symbol),
                "\0"
            )))
        };
    };
}
