//! Proptest strategies for templates and congruence states.

use proptest::prelude::*;

use crate::congruence::{Congruence, CongruenceState};
use crate::template::{LinearExpression, Template};

const VARIABLES: [&str; 4] = ["x", "y", "z", "w"];

/// A non-empty integral template over a small variable pool, with
/// coefficients in `-3..=3`.
pub fn arb_template() -> impl Strategy<Value = Template> {
    proptest::collection::vec((0..VARIABLES.len(), -3i64..=3), 1..=3)
        .prop_filter_map("template must mention a variable", |terms| {
            LinearExpression::new(terms.into_iter().map(|(v, c)| (VARIABLES[v], c)))
                .ok()
                .filter(|e| !e.is_empty())
        })
        .prop_map(Template::int)
}

pub fn arb_congruence() -> impl Strategy<Value = Congruence> {
    prop_oneof![Just(Congruence::Even), Just(Congruence::Odd)]
}

/// A congruence state with up to five facts.
pub fn arb_congruence_state() -> impl Strategy<Value = CongruenceState> {
    proptest::collection::vec((arb_template(), arb_congruence()), 0..=5)
        .prop_map(CongruenceState::of)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateKind;

    proptest! {
        #[test]
        fn generated_templates_are_integral_and_non_empty(t in arb_template()) {
            prop_assert!(t.is_integral());
            prop_assert!(!t.linear().is_empty());
            prop_assert!(t.linear().terms().iter().all(|(_, c)| *c != 0));
            if t.linear().terms().len() > 2 {
                prop_assert_eq!(t.kind(), TemplateKind::Complex);
            }
        }

        #[test]
        fn generated_states_stay_small(state in arb_congruence_state()) {
            prop_assert!(state.len() <= 5);
        }
    }
}
