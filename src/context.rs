//! Access to the value and reload trigger of the nearest enclosing loader.
//!
//! These are looked up through the reactive owner tree, so they work from
//! anywhere within the children of [`Loader::view`](crate::Loader::view),
//! including components nested arbitrarily deep below it.

use leptos::prelude::{provide_context, use_context};

use crate::{coordinator::Dispatch, error::ContextError};

#[derive(Clone)]
struct Loaded<T>(T);

pub(crate) fn provide_loaded<T, V>(value: T, dispatch: Dispatch<V>)
where
    T: Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    provide_context(Loaded(value));
    provide_context(dispatch);
}

/// The value resolved by the nearest enclosing loader of `T`.
pub fn use_value<T>() -> Result<T, ContextError>
where
    T: Clone + 'static,
{
    use_context::<Loaded<T>>()
        .map(|loaded| loaded.0)
        .ok_or(ContextError::OutsideProvider("value"))
}

/// The reload trigger of the nearest enclosing loader taking `V`.
pub fn use_dispatch<V>() -> Result<Dispatch<V>, ContextError>
where
    V: 'static,
{
    use_context::<Dispatch<V>>().ok_or(ContextError::OutsideProvider("dispatch"))
}

/// Like [`use_value`], but panics outside of a loader.
#[track_caller]
pub fn expect_value<T>() -> T
where
    T: Clone + 'static,
{
    match use_value() {
        Ok(value) => value,
        Err(error) => panic!("{error}: {}", std::any::type_name::<T>()),
    }
}

/// Like [`use_dispatch`], but panics outside of a loader.
#[track_caller]
pub fn expect_dispatch<V>() -> Dispatch<V>
where
    V: 'static,
{
    match use_dispatch() {
        Ok(dispatch) => dispatch,
        Err(error) => panic!("{error}: {}", std::any::type_name::<V>()),
    }
}
