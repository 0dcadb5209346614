//! Derives the command-line twin of a configuration structure
// (c) 2024 Ross Younger

#![allow(meta_variable_misuse)] // false positives in these macro definitions

use derive_deftly::define_derive_deftly;

define_derive_deftly! {
    /// Generates `{Name}_Optional`, a copy of the struct with every field wrapped in `Option`.
    ///
    /// Settings live in one struct with real types and a `Default`. The command line
    /// needs the same fields, but only the ones the user typed should count. The twin
    /// parses with [`clap`](https://docs.rs/clap/) like the original, and as a
    /// [`figment::Provider`](https://docs.rs/figment/latest/figment/trait.Provider.html)
    /// it contributes only its `Some` fields, in the global profile, so it overrides files
    /// and defaults without blanking them.
    ///
    /// Attributes written *after* the `derive_deftly` line are copied, field attributes
    /// included. The twin gets `#[derive(Default)]` unless the struct is marked
    /// `#[deftly(already_has_default)]`; `#[deftly(visibility = "pub(crate)")]` overrides
    /// its visibility.
    ///
    /// ```
    /// use derive_deftly::Deftly;
    /// use dashqoe::derive_deftly_template_Optionalify;
    /// #[derive(Deftly)]
    /// #[derive_deftly(Optionalify)]
    /// #[derive(Debug, Clone)]
    /// struct Lab {
    ///     host: String,
    ///     port: u16,
    /// }
    /// let twin = Lab_Optional { port: Some(4433), ..Default::default() };
    /// assert!(twin.host.is_none());
    /// ```
    export Optionalify for struct, expect items:
    ${define TWIN ${paste $tdeftype _Optional}}

    /// Every field optional; see the original struct for meanings
    #[allow(non_camel_case_types)]
    ${tattrs}
    ${if not(tmeta(already_has_default)){
        #[derive(Default)]
    }}
    ${if tmeta(visibility) {
        ${tmeta(visibility) as token_stream}
    } else {
        ${tvis}
    }}
    struct $TWIN {
        $(
            ${fattrs}
            ${fvis} $fname: Option<$ftype>,
        )
    }

    impl figment::Provider for $TWIN {
        fn metadata(&self) -> figment::Metadata {
            // Errors name the option the user typed, not the struct field
            figment::Metadata::named("command-line").interpolater(|_, path| {
                let field = path.last().copied().unwrap_or_default();
                format!("--{}", heck::AsKebabCase(field))
            })
        }

        fn data(&self) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
            let mut given = figment::value::Dict::new();
            $(
                if let Some(value) = &self.$fname {
                    let _ = given.insert(
                        stringify!($fname).to_owned(),
                        figment::value::Value::serialize(value)?,
                    );
                }
            )
            Ok(figment::Profile::Global.collect(given))
        }
    }
}

#[allow(clippy::module_name_repetitions)]
pub use derive_deftly_template_Optionalify;
