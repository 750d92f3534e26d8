use super::super::*;
use crate::state::load_link_count;

pub(in crate::layer) fn handle_cyberlink(
    state: &mut dyn State,
    signer: &PublicKey,
    links: &[Link],
    delivery: &mut Delivery,
) -> Result<(), ExecutionError> {
    let mut count = load_link_count(state)?;
    for link in links {
        let edge = Key::Edge(link.clone());
        if state.get(&edge)?.is_some() {
            continue;
        }
        state.insert(edge, Value::Edge(count))?;
        state.insert(Key::LinkAt(count), Value::LinkAt(link.clone()))?;
        count = count.checked_add(1).ok_or(ExecutionError::Overflow)?;

        delivery.events.push(Event::Linked {
            signer: signer.clone(),
            link: link.clone(),
        });
        delivery.new_links.push(link.clone());
    }
    state.insert(Key::LinkCount, Value::LinkCount(count))?;

    Ok(())
}
