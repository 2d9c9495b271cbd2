//! Accessibility permission check for the event tap

use tracing::{info, warn};

/// Check whether the process may observe global keyboard events
///
/// When untrusted and `prompt` is set, macOS shows its permission dialog.
/// Returns the trust state at the time of the call; a grant made in the
/// dialog only takes effect on the next listener start.
pub fn ensure_accessibility(prompt: bool) -> bool {
    if platform::is_trusted() {
        return true;
    }

    if prompt {
        info!("requesting Accessibility permission");
        platform::request_trust();
    }
    warn!("process is not trusted for Accessibility, Command taps will be ignored");
    false
}

#[cfg(target_os = "macos")]
mod platform {
    use core_foundation::base::TCFType;
    use core_foundation::boolean::CFBoolean;
    use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
    use core_foundation::string::{CFString, CFStringRef};

    #[link(name = "ApplicationServices", kind = "framework")]
    extern "C" {
        static kAXTrustedCheckOptionPrompt: CFStringRef;
        fn AXIsProcessTrusted() -> bool;
        fn AXIsProcessTrustedWithOptions(options: CFDictionaryRef) -> bool;
    }

    pub(super) fn is_trusted() -> bool {
        unsafe { AXIsProcessTrusted() }
    }

    pub(super) fn request_trust() {
        let key = unsafe { CFString::wrap_under_get_rule(kAXTrustedCheckOptionPrompt) };
        let options = CFDictionary::from_CFType_pairs(&[(
            key.as_CFType(),
            CFBoolean::true_value().as_CFType(),
        )]);
        unsafe {
            AXIsProcessTrustedWithOptions(options.as_concrete_TypeRef());
        }
    }
}

#[cfg(not(target_os = "macos"))]
mod platform {
    pub(super) fn is_trusted() -> bool {
        false
    }

    pub(super) fn request_trust() {}
}
