use crate::util::constants::{BYTES_IN_HEAP_PAGE, BYTES_IN_KBYTE, BYTES_IN_MBYTE};
use std::default::Default;

/// The default heap size: the size of the address range reserved for heap pages.
pub const DEFAULT_HEAP_SIZE: usize = 256 * BYTES_IN_MBYTE;
/// The default size of one new-space semi-space.
pub const DEFAULT_NEW_SPACE_SIZE: usize = 4 * BYTES_IN_HEAP_PAGE;
/// The default upper bound a semi-space may grow to.
pub const DEFAULT_MAX_NEW_SPACE_SIZE: usize = 32 * BYTES_IN_HEAP_PAGE;
/// Objects at least this large are allocated directly in old space.
pub const DEFAULT_LARGE_OBJECT_THRESHOLD: usize = 128 * BYTES_IN_KBYTE;
/// A stress factor of this value disables stress GC.
pub const DEFAULT_STRESS_FACTOR: usize = usize::MAX;

fn always_valid<T>(_: &T) -> bool {
    true
}

macro_rules! options {
    ($($(#[$outer:meta])* $name:ident: $type:ty[$validator:expr] = $default:expr),*,) => [
        options!($($(#[$outer])* $name: $type[$validator] = $default),*);
    ];
    ($($(#[$outer:meta])* $name:ident: $type:ty[$validator:expr] = $default:expr),*) => [
        /// Heap options. Each option has a type, a validator and a default value.
        /// Options can be set programmatically (see `HeapBuilder::set_option`), or by
        /// environment variables with the prefix `PAGEHEAP_` (e.g. `PAGEHEAP_HEAP_SIZE`).
        #[derive(Clone, Debug)]
        pub struct Options {
            $($(#[$outer])* pub $name: $type),*
        }
        impl Options {
            /// Set an option by its snake-case name. Returns false (and leaves the option
            /// unchanged) if the name is unknown, or the value cannot be parsed or is invalid.
            pub fn set_from_str(&mut self, s: &str, val: &str) -> bool {
                match s {
                    // Parse the given value from str (by env vars or by calling set_option()) to the right type
                    $(stringify!($name) => if let Ok(typed_val) = val.parse::<$type>() {
                        let validate_fn = $validator;
                        let is_valid = validate_fn(&typed_val);
                        if is_valid {
                            // Only set value if valid.
                            self.$name = typed_val;
                        } else {
                            warn!("Unable to set {}={:?}. Invalid value. Default value will be used.", s, val);
                        }
                        is_valid
                    } else {
                        warn!("Unable to set {}={:?}. Can't parse value. Default value will be used.", s, val);
                        false
                    })*
                    _ => {
                        warn!("Unknown option {}", s);
                        false
                    }
                }
            }

            /// Apply every environment variable that starts with `PAGEHEAP_` and names an option.
            pub fn read_env_var_settings(&mut self) {
                const PREFIX: &str = "PAGEHEAP_";
                for (key, val) in std::env::vars() {
                    // strip the prefix, and get the lower case string
                    if let Some(rest_of_key) = key.strip_prefix(PREFIX) {
                        let lowercase: &str = &rest_of_key.to_lowercase();
                        match lowercase {
                            $(stringify!($name) => { self.set_from_str(lowercase, &val); },)*
                            _ => {}
                        }
                    }
                }
            }
        }
        impl Default for Options {
            fn default() -> Self {
                Options {
                    $($name: $default),*
                }
            }
        }
    ]
}

options! {
    /// The size of the address range reserved for heap pages. Page allocation fails once it is used up.
    heap_size:              usize [|v: &usize| *v >= 4 * BYTES_IN_HEAP_PAGE] = DEFAULT_HEAP_SIZE,
    /// The initial capacity of a new-space semi-space, in bytes.
    new_space_size:         usize [|v: &usize| *v >= BYTES_IN_HEAP_PAGE] = DEFAULT_NEW_SPACE_SIZE,
    /// The capacity a semi-space may grow to after scavenges with high survival.
    max_new_space_size:     usize [|v: &usize| *v >= BYTES_IN_HEAP_PAGE] = DEFAULT_MAX_NEW_SPACE_SIZE,
    /// Objects of at least this size are allocated in old space (on a large page if they exceed a page).
    large_object_threshold: usize [|v: &usize| *v > 0 && *v <= BYTES_IN_HEAP_PAGE / 2] = DEFAULT_LARGE_OBJECT_THRESHOLD,
    /// An old page is evacuated by the compactor if its live bytes are below this percentage of its capacity.
    evacuation_threshold:   usize [|v: &usize| *v <= 100] = 50,
    /// If the survivors of a scavenge fill more than this percentage of new space, all of them are tenured at the next scavenge.
    early_tenure_threshold: usize [|v: &usize| *v <= 100] = 66,
    /// After a full GC, old space may grow by this percentage of its live size before the next full GC.
    old_gen_growth:         usize [always_valid] = 100,
    /// The number of freed standard pages kept mapped for reuse.
    page_cache_capacity:    usize [always_valid] = 8,
    /// Trigger a scavenge every this many bytes allocated by a mutator. Disabled by default.
    stress_factor:          usize [|v: &usize| *v > 0] = DEFAULT_STRESS_FACTOR,
    /// Should we ignore GCs requested by the runtime (e.g. an explicit `gc()` call)?
    ignore_system_gc:       bool  [always_valid] = false,
}

impl Options {
    /// Is stress GC enabled?
    pub fn is_stress_test_gc_enabled(&self) -> bool {
        self.stress_factor != DEFAULT_STRESS_FACTOR
    }

    /// Fix up combinations of options that are individually valid but inconsistent.
    pub(crate) fn normalize(&mut self) {
        if self.max_new_space_size < self.new_space_size {
            warn!(
                "max_new_space_size ({}) is smaller than new_space_size ({}). Using new_space_size.",
                self.max_new_space_size, self.new_space_size
            );
            self.max_new_space_size = self.new_space_size;
        }
        // Both semi-spaces live at the same time during a scavenge, and old space needs room as well.
        let new_space_limit = self.heap_size / 4;
        if self.max_new_space_size > new_space_limit {
            warn!(
                "max_new_space_size ({}) does not fit in the heap ({}). Using {}.",
                self.max_new_space_size, self.heap_size, new_space_limit
            );
            self.max_new_space_size = new_space_limit.max(BYTES_IN_HEAP_PAGE);
            self.new_space_size = self.new_space_size.min(self.max_new_space_size);
        }
    }
}
