//! Macros capturing the enclosing function signature and call site.

/// Expands to the full module path of the enclosing function, as a
/// `&'static str`.
#[macro_export]
macro_rules! function_signature {
    () => {{
        fn here() {}
        fn name_of<T>(_: T) -> &'static str {
            ::core::any::type_name::<T>()
        }
        let full = name_of(here);
        &full[..full.len() - "::here".len()]
    }};
}

/// Profile the enclosing function until the end of the block.
///
/// ```ignore
/// fn resample(frames: &[Frame]) {
///     let _scope = gnomon::function_scope!("audio", frames.len() as f64);
///     // ...
/// }
/// ```
///
/// Arguments, all optional: subsystem, workload weight, session tag.
#[macro_export]
macro_rules! function_scope {
    () => {
        $crate::scope::Scope::function($crate::function_signature!())
    };
    ($subsystem:expr) => {
        $crate::scope::Scope::function_with(
            $crate::function_signature!(),
            ::core::option::Option::Some($subsystem),
            0.0,
            ::core::option::Option::None,
        )
    };
    ($subsystem:expr, $workload:expr) => {
        $crate::scope::Scope::function_with(
            $crate::function_signature!(),
            ::core::option::Option::Some($subsystem),
            $workload,
            ::core::option::Option::None,
        )
    };
    ($subsystem:expr, $workload:expr, $session:expr) => {
        $crate::scope::Scope::function_with(
            $crate::function_signature!(),
            ::core::option::Option::Some($subsystem),
            $workload,
            ::core::option::Option::Some($session),
        )
    };
}

/// Profile a named block inside a function until the end of the enclosing
/// block.
#[macro_export]
macro_rules! block_scope {
    ($name:expr) => {
        $crate::scope::Scope::block($name)
    };
    ($name:expr, $workload:expr) => {
        $crate::scope::Scope::block_with(
            $name,
            ::core::option::Option::None,
            $workload,
            ::core::option::Option::None,
        )
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn function_signature_names_the_enclosing_function() {
        let signature = crate::function_signature!();
        assert!(
            signature.ends_with("function_signature_names_the_enclosing_function"),
            "{signature}"
        );
        assert!(!signature.ends_with("::here"), "{signature}");
    }
}
