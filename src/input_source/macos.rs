//! Text Input Source Services backend
//!
//! Enumerates and selects keyboard input sources through the Carbon TIS
//! API and posts synthetic key events through Core Graphics.

use std::ffi::c_void;

use core_foundation::array::{CFArrayGetCount, CFArrayGetValueAtIndex, CFArrayRef};
use core_foundation::base::{CFRelease, CFTypeRef, TCFType};
use core_foundation::boolean::CFBoolean;
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::string::{CFString, CFStringRef};
use core_graphics::event::{CGEvent, CGEventFlags, CGEventTapLocation};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use tracing::{debug, trace};

use super::{sort_catalog, InputSource, InputSourceBackend, SourceError};
use crate::hotkey::KeyCode;

type TISInputSourceRef = *const c_void;
type OSStatus = i32;

const NO_ERR: OSStatus = 0;
const CATEGORY_INPUT_METHOD: &str = "TISCategoryInputMethod";

#[link(name = "Carbon", kind = "framework")]
extern "C" {
    static kTISPropertyInputSourceIsSelectCapable: CFStringRef;
    static kTISPropertyInputSourceCategory: CFStringRef;
    static kTISPropertyInputSourceID: CFStringRef;
    static kTISPropertyLocalizedName: CFStringRef;
    static kTISCategoryKeyboardInputSource: CFStringRef;

    fn TISCreateInputSourceList(properties: CFDictionaryRef, include_all_installed: u8) -> CFArrayRef;
    fn TISGetInputSourceProperty(source: TISInputSourceRef, key: CFStringRef) -> CFTypeRef;
    fn TISSelectInputSource(source: TISInputSourceRef) -> OSStatus;
    fn TISCopyCurrentKeyboardInputSource() -> TISInputSourceRef;
}

/// Owned `CFArray` of `TISInputSourceRef`s returned by a create call
struct SourceList(CFArrayRef);

impl SourceList {
    /// Query the registry with a property filter
    fn query(filter: &CFDictionary<CFString, CFBoolean>) -> Option<Self> {
        let raw = unsafe { TISCreateInputSourceList(filter.as_concrete_TypeRef(), 0) };
        (!raw.is_null()).then_some(Self(raw))
    }

    fn query_id(id: &str) -> Option<Self> {
        let key = unsafe { CFString::wrap_under_get_rule(kTISPropertyInputSourceID) };
        let filter = CFDictionary::from_CFType_pairs(&[(key, CFString::new(id))]);
        let raw = unsafe { TISCreateInputSourceList(filter.as_concrete_TypeRef(), 0) };
        (!raw.is_null()).then_some(Self(raw))
    }

    fn iter(&self) -> impl Iterator<Item = TISInputSourceRef> + '_ {
        let count = unsafe { CFArrayGetCount(self.0) };
        (0..count).map(move |i| unsafe { CFArrayGetValueAtIndex(self.0, i) })
    }
}

impl Drop for SourceList {
    fn drop(&mut self) {
        unsafe { CFRelease(self.0 as CFTypeRef) }
    }
}

/// Read a string property of an input source
fn string_property(source: TISInputSourceRef, key: CFStringRef) -> Option<String> {
    let raw = unsafe { TISGetInputSourceProperty(source, key) };
    if raw.is_null() {
        return None;
    }
    let value = unsafe { CFString::wrap_under_get_rule(raw as CFStringRef) };
    Some(value.to_string())
}

/// Text Input Source Services backend for macOS
#[derive(Debug, Default)]
pub struct TisBackend;

impl InputSourceBackend for TisBackend {
    fn list_sources(&self) -> Vec<InputSource> {
        let key = unsafe { CFString::wrap_under_get_rule(kTISPropertyInputSourceIsSelectCapable) };
        let filter = CFDictionary::from_CFType_pairs(&[(key, CFBoolean::true_value())]);

        let Some(list) = SourceList::query(&filter) else {
            debug!("input source registry returned no list");
            return Vec::new();
        };

        let keyboard_category =
            unsafe { CFString::wrap_under_get_rule(kTISCategoryKeyboardInputSource) }.to_string();

        let mut sources: Vec<InputSource> = list
            .iter()
            .filter_map(|source| {
                let category = unsafe { string_property(source, kTISPropertyInputSourceCategory) }?;
                if category != keyboard_category && category != CATEGORY_INPUT_METHOD {
                    return None;
                }
                let id = unsafe { string_property(source, kTISPropertyInputSourceID) }?;
                let name = unsafe { string_property(source, kTISPropertyLocalizedName) }?;
                Some(InputSource::new(id, name))
            })
            .collect();

        sort_catalog(&mut sources);
        trace!(count = sources.len(), "enumerated input sources");
        sources
    }

    fn current_source_id(&self) -> Option<String> {
        let current = unsafe { TISCopyCurrentKeyboardInputSource() };
        if current.is_null() {
            return None;
        }
        let id = unsafe { string_property(current, kTISPropertyInputSourceID) };
        unsafe { CFRelease(current) };
        id
    }

    fn select_source(&self, id: &str) -> Result<(), SourceError> {
        let list = SourceList::query_id(id).ok_or_else(|| SourceError::NotFound(id.to_string()))?;
        let source = list
            .iter()
            .next()
            .ok_or_else(|| SourceError::NotFound(id.to_string()))?;

        let status = unsafe { TISSelectInputSource(source) };
        if status != NO_ERR {
            return Err(SourceError::SelectFailed(status));
        }
        Ok(())
    }

    fn post_key_press(&self, code: KeyCode) -> Result<(), SourceError> {
        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .map_err(|_| SourceError::EventPost)?;

        for key_down in [true, false] {
            let event = CGEvent::new_keyboard_event(source.clone(), code, key_down)
                .map_err(|_| SourceError::EventPost)?;
            event.set_flags(CGEventFlags::empty());
            event.post(CGEventTapLocation::HID);
        }
        Ok(())
    }
}
